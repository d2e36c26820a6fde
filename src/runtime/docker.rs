use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full, Limited};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::{net::UnixStream, time::timeout};

use crate::{
    config,
    core::{AgentError, AgentResult, ContainerRuntime, ContainerSpec},
};

const API_HOST: &str = "docker";
const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Docker Engine API client over the daemon's unix socket.
///
/// One HTTP/1.1 connection per call. The whole exchange, connect to the last
/// body byte, is bounded by the configured timeout.
pub struct DockerRuntime {
    socket_path: PathBuf,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Warnings", default)]
    warnings: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

impl DockerRuntime {
    pub fn new(config: &config::Runtime) -> Self {
        Self {
            socket_path: PathBuf::from(config.socket_path()),
            timeout: Duration::from_secs(config.timeout),
        }
    }

    fn create_request(spec: &ContainerSpec) -> AgentResult<Request<Full<Bytes>>> {
        let body = serde_json::to_vec(spec).map_err(|e| provision_error(spec, e))?;
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("name", &spec.name)
            .finish();
        Request::builder()
            .method(Method::POST)
            .uri(format!("/containers/create?{query}"))
            .header(header::HOST, API_HOST)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| provision_error(spec, e))
    }

    /// Send one request on a fresh connection and collect the response
    async fn send(&self, request: Request<Full<Bytes>>) -> Result<(StatusCode, Bytes), String> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            format!("runtime at {} unreachable: {e}", self.socket_path.display())
        })?;

        let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| format!("handshake failed: {e}"))?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                log::debug!("Runtime connection closed: {e}");
            }
        });

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        let status = response.status();
        let body = Limited::new(response.into_body(), MAX_RESPONSE_BYTES)
            .collect()
            .await
            .map_err(|e| format!("reading response failed: {e}"))?
            .to_bytes();
        Ok((status, body))
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> AgentResult<String> {
        let request = Self::create_request(spec)?;
        let (status, body) = timeout(self.timeout, self.send(request))
            .await
            .map_err(|_| {
                provision_error(
                    spec,
                    format!("runtime did not answer within {:?}", self.timeout),
                )
            })?
            .map_err(|e| provision_error(spec, e))?;

        if status != StatusCode::CREATED {
            let message = serde_json::from_slice::<ErrorResponse>(&body)
                .map(|e| e.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
            return Err(provision_error(
                spec,
                format!("{}: {}", status, message.trim()),
            ));
        }

        let created: CreateResponse =
            serde_json::from_slice(&body).map_err(|e| provision_error(spec, e))?;
        for warning in created.warnings.unwrap_or_default() {
            log::warn!("Runtime warning for container {}: {warning}", spec.name);
        }
        Ok(created.id)
    }
}

fn provision_error(spec: &ContainerSpec, cause: impl std::fmt::Display) -> AgentError {
    AgentError::Provision {
        name: spec.name.clone(),
        cause: cause.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::UnixListener,
    };

    use super::*;

    fn socket_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("provisiond-{tag}-{}.sock", uuid::Uuid::new_v4()))
    }

    fn runtime_at(path: &std::path::Path, timeout: u64) -> DockerRuntime {
        DockerRuntime::new(&config::Runtime {
            endpoint: format!("unix://{}", path.display()),
            timeout,
        })
    }

    /// Accept one connection, read the request through its JSON body and
    /// answer with `response`.
    async fn serve_once(listener: UnixListener, response: &'static [u8]) -> String {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            if n == 0 || request.ends_with(b"}") {
                break;
            }
        }
        stream.write_all(response).await.unwrap();
        stream.shutdown().await.unwrap();
        String::from_utf8(request).unwrap()
    }

    #[test]
    fn test_create_request_encodes_name() {
        let request =
            DockerRuntime::create_request(&ContainerSpec::new("my web#1", "nginx:latest"))
                .unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(
            request.uri().path_and_query().unwrap().as_str(),
            "/containers/create?name=my+web%231"
        );
        assert_eq!(request.headers()[header::HOST], API_HOST);
    }

    #[tokio::test]
    async fn test_create_container_over_socket() {
        let path = socket_path("created");
        let listener = UnixListener::bind(&path).unwrap();
        let server = tokio::spawn(serve_once(
            listener,
            b"HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nContent-Length: 31\r\n\r\n{\"Id\":\"c0ffee\",\"Warnings\":null}",
        ));

        let id = runtime_at(&path, 5)
            .create_container(&ContainerSpec::new("web", "nginx:latest"))
            .await
            .unwrap();
        assert_eq!(id, "c0ffee");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /containers/create?name=web HTTP/1.1\r\n"));
        assert!(request.ends_with("\r\n\r\n{\"Image\":\"nginx:latest\"}"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_query_characters_stay_in_name() {
        let path = socket_path("encoded");
        let listener = UnixListener::bind(&path).unwrap();
        let server = tokio::spawn(serve_once(
            listener,
            b"HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nContent-Length: 31\r\n\r\n{\"Id\":\"c0ffee\",\"Warnings\":null}",
        ));

        runtime_at(&path, 5)
            .create_container(&ContainerSpec::new("web&force=1", "nginx:latest"))
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /containers/create?name=web%26force%3D1 HTTP/1.1\r\n"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_create_container_conflict() {
        let path = socket_path("conflict");
        let listener = UnixListener::bind(&path).unwrap();
        let server = tokio::spawn(serve_once(
            listener,
            b"HTTP/1.1 409 Conflict\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{\"message\":\"Conflict. The container name \\\"/web\\\" is already in use\"}",
        ));

        match runtime_at(&path, 5)
            .create_container(&ContainerSpec::new("web", "nginx:latest"))
            .await
        {
            Err(AgentError::Provision { name, cause }) => {
                assert_eq!(name, "web");
                assert!(cause.contains("409"));
                assert!(cause.contains("already in use"));
            }
            other => panic!("unexpected {other:?}"),
        }
        server.await.unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_chunked_error_body() {
        let path = socket_path("chunked");
        let listener = UnixListener::bind(&path).unwrap();
        let server = tokio::spawn(serve_once(
            listener,
            b"HTTP/1.1 404 Not Found\r\nTransfer-Encoding: chunked\r\n\r\n7\r\n{\"messa\r\n10\r\nge\":\"no image\"} \r\n0\r\n\r\n",
        ));

        match runtime_at(&path, 5)
            .create_container(&ContainerSpec::new("web", "nginx:missing"))
            .await
        {
            Err(AgentError::Provision { cause, .. }) => {
                assert!(cause.contains("404"));
                assert!(cause.ends_with("no image"));
            }
            other => panic!("unexpected {other:?}"),
        }
        server.await.unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_runtime_silent_times_out() {
        let path = socket_path("silent");
        let listener = UnixListener::bind(&path).unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(stream);
        });

        match runtime_at(&path, 1)
            .create_container(&ContainerSpec::new("web", "nginx:latest"))
            .await
        {
            Err(AgentError::Provision { cause, .. }) => assert!(cause.contains("did not answer")),
            other => panic!("unexpected {other:?}"),
        }
        server.abort();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_runtime_unreachable() {
        match runtime_at(&socket_path("missing"), 5)
            .create_container(&ContainerSpec::new("web", "nginx:latest"))
            .await
        {
            Err(AgentError::Provision { cause, .. }) => assert!(cause.contains("unreachable")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
