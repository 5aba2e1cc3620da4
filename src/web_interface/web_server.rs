use std::net::{IpAddr, SocketAddr};

use log::info;

use super::routes::operator_routes;
use crate::configuration::types::ApiConfig;
use crate::controller::controller_handler::ControllerHandle;
use crate::error_handling::types::ConfigError;

/// HTTP front of the operator controls.
pub struct WebServer {
    handle: ControllerHandle,
    addr: SocketAddr,
}

impl WebServer {
    /// # Errors
    ///
    /// `ConfigError::BadEndpoint` if `bind_address` is not an IP address.
    pub fn new(handle: ControllerHandle, api: &ApiConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            handle,
            addr: bind_addr(api)?,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serves until the process exits.
    pub async fn start(self) {
        let routes = operator_routes(self.handle);
        info!("operator API listening on http://{}", self.addr);
        warp::serve(routes).run(self.addr).await;
    }
}

pub fn bind_addr(api: &ApiConfig) -> Result<SocketAddr, ConfigError> {
    let ip: IpAddr = api.bind_address.parse().map_err(|_| {
        ConfigError::BadEndpoint(format!("api.bind_address {:?}", api.bind_address))
    })?;
    Ok(SocketAddr::new(ip, api.port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_address_must_be_an_ip() {
        let mut api = ApiConfig::default();
        assert_eq!(
            bind_addr(&api).unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );

        api.bind_address = "localhost".into();
        assert!(matches!(
            bind_addr(&api),
            Err(ConfigError::BadEndpoint(_))
        ));
    }
}
