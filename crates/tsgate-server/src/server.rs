//! warp front end
//!
//! One catch-all route: every request is turned into an
//! [`UpstreamRequest`] against the upstream origin and answered by the
//! [`Interceptor`](crate::Interceptor).

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tsgate_upstream::{UpstreamRequest, UpstreamResponse};
use warp::http::header::CONTENT_TYPE;
use warp::http::{HeaderMap, HeaderValue, Method, Response, StatusCode};
use warp::hyper::body::Bytes;
use warp::hyper::Body;
use warp::path::FullPath;
use warp::{Filter, Rejection};

use crate::error::ServerError;
use crate::interceptor::end_to_end_headers;
use crate::Gateway;

/// Catch-all filter answering every request through the gateway
pub fn routes(
    gateway: Arc<Gateway>,
) -> impl Filter<Extract = (Response<Body>,), Error = Rejection> + Clone + Send + Sync + 'static {
    let raw_query = warp::query::raw()
        .map(Some)
        .or(warp::any().map(|| None::<String>))
        .unify();

    warp::method()
        .and(warp::path::full())
        .and(raw_query)
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and_then(
            move |method: Method, path: FullPath, query: Option<String>, headers: HeaderMap, body: Bytes| {
                let gateway = Arc::clone(&gateway);
                async move {
                    Ok::<_, Infallible>(proxy(&gateway, method, &path, query, &headers, body).await)
                }
            },
        )
}

/// Serve until `shutdown` resolves
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the listen address cannot be bound.
pub async fn serve(
    gateway: Arc<Gateway>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let addr = gateway.settings().listen;
    let (bound, server) = warp::serve(routes(gateway))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| ServerError::Bind {
            addr,
            message: e.to_string(),
        })?;

    tracing::info!(addr = %bound, "Gateway listening");
    server.await;
    tracing::info!("Gateway stopped");
    Ok(())
}

async fn proxy(
    gateway: &Gateway,
    method: Method,
    path: &FullPath,
    query: Option<String>,
    headers: &HeaderMap,
    body: Bytes,
) -> Response<Body> {
    let target = match query {
        Some(query) if !query.is_empty() => format!("{}?{query}", path.as_str()),
        _ => path.as_str().to_string(),
    };
    let url = match gateway.request_url(&target) {
        Ok(url) => url,
        Err(error) => return plain(StatusCode::BAD_REQUEST, error.to_string()),
    };

    let mut request = UpstreamRequest::get(url).with_method(method.as_str());
    request.headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    request.body = body.to_vec();

    let response = gateway.interceptor().handle(request).await;
    tracing::info!(method = %method, target = %target, status = response.status, "Served");
    into_reply(response)
}

fn into_reply(response: UpstreamResponse) -> Response<Body> {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in end_to_end_headers(&response.headers) {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(response.body)).unwrap_or_else(|error| {
        tracing::warn!(error = %error, "Upstream response could not be relayed");
        plain(StatusCode::BAD_GATEWAY, "invalid upstream response".to_string())
    })
}

fn plain(status: StatusCode, text: String) -> Response<Body> {
    let mut response = Response::new(Body::from(text));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
