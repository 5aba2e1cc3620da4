use log::warn;
use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::{Filter, Rejection, Reply};

use super::types::*;
use crate::controller::controller_handler::ControllerHandle;
use crate::error_handling::types::ControllerError;
use crate::session_management::session::parse_regime;

const MAX_BODY_BYTES: u64 = 16 * 1024;

fn with_handle(
    handle: ControllerHandle,
) -> impl Filter<Extract = (ControllerHandle,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || handle.clone())
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    reply::with_status(
        reply::json(&ApiError {
            message: message.into(),
        }),
        status,
    )
    .into_response()
}

fn respond<T: Serialize>(result: Result<T, ControllerError>) -> Response {
    match result {
        Ok(value) => reply::with_status(reply::json(&value), StatusCode::OK).into_response(),
        Err(e) => {
            warn!("request failed: {}", e);
            error_response(status_for(&e), e.to_string())
        }
    }
}

pub async fn get_status(handle: ControllerHandle) -> Result<Response, Rejection> {
    Ok(respond(handle.status().await))
}

pub async fn get_image(handle: ControllerHandle) -> Result<Response, Rejection> {
    Ok(match handle.image().await {
        Ok(Some(view)) => respond(Ok::<_, ControllerError>(view)),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "no image capture is pending"),
        Err(e) => respond::<()>(Err(e)),
    })
}

pub async fn post_connect(
    request: ConnectRequest,
    handle: ControllerHandle,
) -> Result<Response, Rejection> {
    let result = handle
        .connect(request.into())
        .await
        .map(|connection_id| ConnectResponse { connection_id });
    Ok(respond(result))
}

pub async fn post_disconnect(handle: ControllerHandle) -> Result<Response, Rejection> {
    let result = handle
        .disconnect()
        .await
        .map(|accepted| Accepted { accepted });
    Ok(respond(result))
}

pub async fn post_command(body: TextBody, handle: ControllerHandle) -> Result<Response, Rejection> {
    let result = handle
        .send_command(body.text)
        .await
        .map(|()| Accepted { accepted: true });
    Ok(respond(result))
}

pub async fn post_capture(handle: ControllerHandle) -> Result<Response, Rejection> {
    let result = handle.capture().await.map(|()| Accepted { accepted: true });
    Ok(respond(result))
}

pub async fn put_regime(body: RegimeBody, handle: ControllerHandle) -> Result<Response, Rejection> {
    let regime = parse_regime(&body.value);
    let result = handle
        .set_regime(regime)
        .await
        .map(|()| RegimeResponse { regime });
    Ok(respond(result))
}

pub async fn post_entry(body: TextBody, handle: ControllerHandle) -> Result<Response, Rejection> {
    let result = handle
        .add_entry(body.text)
        .await
        .map(|accepted| Accepted { accepted });
    Ok(respond(result))
}

pub async fn post_upload(handle: ControllerHandle) -> Result<Response, Rejection> {
    Ok(respond(handle.upload().await))
}

/// Every operator endpoint, composed.
pub fn operator_routes(
    handle: ControllerHandle,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let status = warp::path!("status")
        .and(warp::get())
        .and(with_handle(handle.clone()))
        .and_then(get_status);

    let image = warp::path!("image")
        .and(warp::get())
        .and(with_handle(handle.clone()))
        .and_then(get_image);

    let connect = warp::path!("connect")
        .and(warp::post())
        .and(json_body())
        .and(with_handle(handle.clone()))
        .and_then(post_connect);

    let disconnect = warp::path!("disconnect")
        .and(warp::post())
        .and(with_handle(handle.clone()))
        .and_then(post_disconnect);

    let command = warp::path!("command")
        .and(warp::post())
        .and(json_body())
        .and(with_handle(handle.clone()))
        .and_then(post_command);

    let capture = warp::path!("capture")
        .and(warp::post())
        .and(with_handle(handle.clone()))
        .and_then(post_capture);

    let regime = warp::path!("regime")
        .and(warp::put())
        .and(json_body())
        .and(with_handle(handle.clone()))
        .and_then(put_regime);

    let entries = warp::path!("entries")
        .and(warp::post())
        .and(json_body())
        .and(with_handle(handle.clone()))
        .and_then(post_entry);

    let upload = warp::path!("upload")
        .and(warp::post())
        .and(with_handle(handle))
        .and_then(post_upload);

    status
        .or(image)
        .or(connect)
        .or(disconnect)
        .or(command)
        .or(capture)
        .or(regime)
        .or(entries)
        .or(upload)
}
