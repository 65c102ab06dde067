//! HTTP handler for the MITM proxy.
//!
//! Decrypted requests to provider hosts are buffered, run through the
//! [`Interceptor`] and forwarded, rewritten or not. Everything else is
//! forwarded untouched, and CONNECT tunnels to other hosts are not decrypted.

use http_body_util::{BodyExt, BodyStream, Full, StreamBody};
use hudsucker::{
    futures::{stream, StreamExt},
    hyper::{header, Method, Request, Response},
    Body, HttpContext, HttpHandler, RequestOrResponse,
};
use hyper::body::{Bytes, Frame};
use tracing::{debug, warn};

use crate::domains::is_provider_host;
use crate::interceptor::{InterceptedRequest, Interceptor};

/// Largest request body the handler will buffer.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

fn bytes_to_body(bytes: Bytes) -> Body {
    Body::from(Full::new(bytes))
}

/// Frames already read off `rest`, followed by whatever is left of it.
fn replay_body(read: Vec<Frame<Bytes>>, rest: Body) -> Body {
    let head = stream::iter(read.into_iter().map(Ok));
    Body::from(StreamBody::new(head.chain(BodyStream::new(rest))))
}

/// What came of buffering a request body.
enum Buffered {
    Complete(Bytes),
    /// Too large, carrying trailers, or failed mid-stream.
    Unread(Body),
}

/// Runs the interception pipeline on proxied requests.
#[derive(Clone, Debug)]
pub struct ProxyHandler {
    interceptor: Interceptor,
    max_body_bytes: usize,
}

impl ProxyHandler {
    pub fn new(interceptor: Interceptor) -> Self {
        Self {
            interceptor,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Returns the request to forward upstream.
    pub async fn process(&self, req: Request<Body>) -> Request<Body> {
        let Some(host) = Self::extract_host(&req) else {
            return req;
        };

        if !is_provider_host(&host) || req.method() != Method::POST {
            return req;
        }

        if req.headers().contains_key(header::CONTENT_ENCODING) {
            debug!(host = %host, "Encoded request body, forwarding as is");
            return req;
        }

        if Self::declared_length(&req).is_some_and(|len| len > self.max_body_bytes) {
            debug!(host = %host, "Request body too large, forwarding as is");
            return req;
        }

        let url = Self::absolute_url(&host, &req);
        let origin = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let (parts, body) = req.into_parts();
        let body_bytes = match self.buffer(body).await {
            Buffered::Complete(bytes) => bytes,
            Buffered::Unread(body) => {
                debug!(host = %host, "Request body not buffered, forwarding as is");
                return Request::from_parts(parts, body);
            }
        };

        let text = match std::str::from_utf8(&body_bytes) {
            Ok(text) => text.to_string(),
            Err(_) => {
                debug!(host = %host, "Non UTF-8 request body, forwarding as is");
                return Request::from_parts(parts, bytes_to_body(body_bytes));
            }
        };

        let mut request = InterceptedRequest::new(parts.method.as_str(), url, text);
        request.origin = origin;

        let interception = self.interceptor.intercept(request).await;
        if !interception.is_modified() {
            return Request::from_parts(parts, bytes_to_body(body_bytes));
        }

        let rewritten = Bytes::from(interception.request.body.to_wire());
        let mut req = Request::from_parts(parts, bytes_to_body(rewritten.clone()));
        req.headers_mut().remove(header::TRANSFER_ENCODING);
        req.headers_mut()
            .insert(header::CONTENT_LENGTH, header::HeaderValue::from(rewritten.len()));
        req
    }

    /// Reads `body` up to the size limit.
    ///
    /// Anything that stops the read early hands back a body that replays
    /// the frames read so far ahead of the remainder.
    async fn buffer(&self, mut body: Body) -> Buffered {
        let mut frames = Vec::new();
        let mut len = 0;

        while let Some(frame) = body.frame().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Failed to read request body: {}", e);
                    return Buffered::Unread(replay_body(frames, body));
                }
            };
            let Some(data_len) = frame.data_ref().map(Bytes::len) else {
                frames.push(frame);
                return Buffered::Unread(replay_body(frames, body));
            };
            len += data_len;
            frames.push(frame);
            if len > self.max_body_bytes {
                return Buffered::Unread(replay_body(frames, body));
            }
        }

        let mut bytes = Vec::with_capacity(len);
        for frame in frames {
            if let Ok(data) = frame.into_data() {
                bytes.extend_from_slice(&data);
            }
        }
        Buffered::Complete(Bytes::from(bytes))
    }

    /// Whether a CONNECT tunnel should be decrypted.
    fn intercepts_tunnel(req: &Request<Body>) -> bool {
        Self::extract_host(req).is_some_and(|host| is_provider_host(&host))
    }

    /// Extracts host from request URI or Host header.
    fn extract_host(req: &Request<Body>) -> Option<String> {
        if let Some(host) = req.uri().host() {
            return Some(host.to_string());
        }

        req.headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.split(':').next().unwrap_or(s).to_string())
    }

    fn declared_length(req: &Request<Body>) -> Option<usize> {
        req.headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    fn absolute_url(host: &str, req: &Request<Body>) -> String {
        if req.uri().scheme().is_some() {
            return req.uri().to_string();
        }
        let path = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("https://{}{}", host, path)
    }
}

impl HttpHandler for ProxyHandler {
    async fn handle_request(&mut self, _ctx: &HttpContext, req: Request<Body>) -> RequestOrResponse {
        RequestOrResponse::Request(self.process(req).await)
    }

    async fn handle_response(&mut self, _ctx: &HttpContext, res: Response<Body>) -> Response<Body> {
        res
    }

    async fn should_intercept(&mut self, _ctx: &HttpContext, req: &Request<Body>) -> bool {
        Self::intercepts_tunnel(req)
    }
}
