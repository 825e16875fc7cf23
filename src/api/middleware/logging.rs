//! Request logging middleware
//!
//! Tags every request with an id (reusing a client-supplied `x-request-id`),
//! echoes it on the response and logs the outcome with its latency.

use crate::utils::generate_request_id;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    rc::Rc,
    time::Instant,
};
use tracing::{info, warn};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request logging middleware
pub struct RequestLogging {
    enabled: bool,
}

impl RequestLogging {
    /// When `enabled` is false only the request id header is added
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggingMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingMiddleware {
            service: Rc::new(service),
            enabled: self.enabled,
        }))
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: Rc<S>,
    enabled: bool,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let enabled = self.enabled;
        let start_time = Instant::now();

        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .filter(|id| !id.is_empty() && id.len() <= 128)
            .map(str::to_string)
            .unwrap_or_else(generate_request_id);
        let method = req.method().to_string();
        let path = req.path().to_string();

        Box::pin(async move {
            let mut response = service.call(req).await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            match &mut response {
                Ok(service_response) => {
                    if let Ok(value) = HeaderValue::from_str(&request_id) {
                        service_response
                            .headers_mut()
                            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                    }

                    let status = service_response.status();
                    if enabled && status.is_success() {
                        info!(
                            request_id = %request_id,
                            method = %method,
                            path = %path,
                            status = status.as_u16(),
                            duration_ms,
                            "HTTP request completed"
                        );
                    } else if enabled {
                        warn!(
                            request_id = %request_id,
                            method = %method,
                            path = %path,
                            status = status.as_u16(),
                            duration_ms,
                            "HTTP request failed"
                        );
                    }
                }
                Err(error) => {
                    if enabled {
                        warn!(
                            request_id = %request_id,
                            method = %method,
                            path = %path,
                            duration_ms,
                            error = %error,
                            "HTTP request errored"
                        );
                    }
                }
            }

            response
        })
    }
}
