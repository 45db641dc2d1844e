//! Plex HTTP client: lists library sections and requests partial refreshes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::config::PlexConfig;
use crate::library::{LibraryTarget, MediaType};
use crate::service::{LibraryProvider, RefreshClient, RefreshError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TOKEN_HEADER: &str = "X-Plex-Token";

#[derive(Debug, Deserialize)]
struct SectionsResponse {
    #[serde(rename = "MediaContainer")]
    container: MediaContainer,
}

#[derive(Debug, Deserialize)]
struct MediaContainer {
    #[serde(rename = "Directory", default)]
    directories: Vec<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    key: String,
    title: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(rename = "Location", default)]
    locations: Vec<Location>,
}

#[derive(Debug, Deserialize)]
struct Location {
    path: String,
}

impl From<Section> for LibraryTarget {
    fn from(section: Section) -> Self {
        LibraryTarget {
            id: section.key,
            name: section.title,
            media_type: MediaType::from_section_type(&section.kind),
            root_paths: section.locations.into_iter().map(|l| PathBuf::from(l.path)).collect(),
        }
    }
}

pub struct PlexClient {
    agent: ureq::Agent,
    base: Url,
    token: String,
}

impl PlexClient {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self, RefreshError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| RefreshError::NotConfigured(format!("invalid url {base_url:?}: {e}")))?;
        // join() replaces the last segment unless the base ends with '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT.min(timeout))
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();

        Ok(PlexClient {
            agent,
            base,
            token: token.into(),
        })
    }

    pub fn from_config(config: &PlexConfig) -> Result<Self, RefreshError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| RefreshError::NotConfigured("plex.url is not set".into()))?;
        let token = config
            .token
            .as_deref()
            .ok_or_else(|| RefreshError::NotConfigured("plex.token is not set".into()))?;
        PlexClient::new(url, token, config.timeout)
    }

    fn endpoint(&self, path: &str) -> Result<Url, RefreshError> {
        self.base
            .join(path)
            .map_err(|e| RefreshError::NotConfigured(format!("cannot build {path}: {e}")))
    }

    fn get(&self, url: &Url, query: Option<(&str, &str)>) -> Result<ureq::Response, RefreshError> {
        let mut request = self
            .agent
            .request_url("GET", url)
            .set(TOKEN_HEADER, &self.token)
            .set("Accept", "application/json");
        if let Some((key, value)) = query {
            request = request.query(key, value);
        }

        request.call().map_err(|e| match e {
            ureq::Error::Status(code, _) => RefreshError::Status {
                url: url.to_string(),
                code,
            },
            ureq::Error::Transport(t) => RefreshError::Transport {
                url: url.to_string(),
                message: t.to_string(),
            },
        })
    }
}

impl RefreshClient for PlexClient {
    fn refresh(&self, library_id: &str, path: &Path) -> Result<bool, RefreshError> {
        let url = self.endpoint(&format!("library/sections/{library_id}/refresh"))?;
        let path = path.to_string_lossy();
        let response = self.get(&url, Some(("path", &path)))?;
        let accepted = (200..300).contains(&response.status());
        tracing::debug!(library = library_id, path = %path, status = response.status(), "refresh requested");
        Ok(accepted)
    }
}

impl LibraryProvider for PlexClient {
    fn list_libraries(&self) -> Result<Vec<LibraryTarget>, RefreshError> {
        let url = self.endpoint("library/sections")?;
        let response = self.get(&url, None)?;
        let sections: SectionsResponse = response.into_json().map_err(|e| RefreshError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let targets: Vec<LibraryTarget> = sections
            .container
            .directories
            .into_iter()
            .map(LibraryTarget::from)
            .collect();
        tracing::debug!(count = targets.len(), "libraries listed");
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Answer one request with `response` and hand back what was received.
    fn serve_once(response: String) -> (String, crossbeam_channel::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let n = stream.read(&mut buf).unwrap_or(0);
                let _ = tx.send(String::from_utf8_lossy(&buf[..n]).into_owned());
                let _ = stream.write_all(response.as_bytes());
            }
        });
        (format!("http://{addr}"), rx)
    }

    fn ok_json(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    #[test]
    fn lists_sections_with_locations() {
        let body = r#"{"MediaContainer":{"size":2,"Directory":[
            {"key":"1","title":"Movies","type":"movie","Location":[{"id":1,"path":"/data/Movies"}]},
            {"key":"4","title":"Music","type":"artist","Location":[{"id":2,"path":"/data/Music"},{"id":3,"path":"/data/Music2"}]}
        ]}}"#;
        let (url, requests) = serve_once(ok_json(body));
        let client = PlexClient::new(&url, "secret", Duration::from_secs(5)).unwrap();

        let targets = client.list_libraries().unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].id, "1");
        assert_eq!(targets[0].media_type, MediaType::Movie);
        assert_eq!(targets[1].media_type, MediaType::Music);
        assert_eq!(targets[1].root_paths.len(), 2);

        let request = requests.recv().unwrap();
        assert!(request.starts_with("GET /library/sections "));
        assert!(request.to_ascii_lowercase().contains("x-plex-token: secret"));
    }

    #[test]
    fn refresh_sends_path_query() {
        let (url, requests) = serve_once(ok_json("{}"));
        let client = PlexClient::new(&url, "t", Duration::from_secs(5)).unwrap();

        assert!(client.refresh("3", Path::new("/data/TV/Show A")).unwrap());
        let request = requests.recv().unwrap();
        assert!(request.starts_with("GET /library/sections/3/refresh?path=%2Fdata%2FTV%2FShow"));
    }

    #[test]
    fn error_status_is_reported() {
        let (url, _requests) =
            serve_once("HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string());
        let client = PlexClient::new(&url, "bad", Duration::from_secs(5)).unwrap();
        let err = client.refresh("1", Path::new("/data")).unwrap_err();
        assert!(matches!(err, RefreshError::Status { code: 401, .. }));
    }

    #[test]
    fn unreachable_server_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = PlexClient::new(&format!("http://{addr}"), "t", Duration::from_secs(2)).unwrap();
        let err = client.list_libraries().unwrap_err();
        assert!(err.class().is_transient());
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(matches!(
            PlexClient::new("not a url", "t", Duration::from_secs(1)),
            Err(RefreshError::NotConfigured(_))
        ));
    }
}
