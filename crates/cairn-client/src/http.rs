//! Request plumbing shared by the store and its workers.

use std::collections::HashSet;

use bytes::Bytes;
use cairn_chunks::Hints;
use cairn_protocol::{
    decode_chunks, decode_has_response, decode_hash_list, encode_chunks, encode_ref_form,
    encode_write_body, endpoints, gunzip, gzip, names_gzip, params, ref_path, FORM_CONTENT_TYPE,
    GZIP, PROTOCOL_VERSION, VERSION_HEADER,
};
use cairn_types::{Chunk, Hash};
use reqwest::header::{
    HeaderValue, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::retry::retry_send;

/// An HTTP connection to one Cairn database.
#[derive(Debug)]
pub(crate) struct Remote {
    http: reqwest::Client,
    base: Url,
    auth: Option<HeaderValue>,
    pub(crate) config: ClientConfig,
}

impl Remote {
    pub(crate) fn new(config: ClientConfig) -> ClientResult<Self> {
        let base = Url::parse(&config.base_url)?;
        let auth = config
            .auth_header
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|e| ClientError::InvalidHeader(e.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| ClientError::Http {
                endpoint: config.base_url.clone(),
                source,
            })?;
        Ok(Self {
            http,
            base,
            auth,
            config,
        })
    }

    /// `path` under the base URL, keeping the base's own query parameters.
    pub(crate) fn url(&self, path: &str, query: &[(&str, String)]) -> Url {
        let mut url = self.base.clone();
        let joined = format!("{}{}", self.base.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.http.request(method, url);
        match &self.auth {
            Some(auth) => req.header(AUTHORIZATION, auth.clone()),
            None => req,
        }
    }

    /// Send a request, retrying transport failures if `idempotent`, and
    /// check the server's protocol version.
    async fn send<F>(&self, endpoint: &str, idempotent: bool, build: F) -> ClientResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let sent = if idempotent {
            retry_send(&self.config, endpoint, || build().send()).await
        } else {
            build().send().await
        };
        let resp = sent.map_err(|source| ClientError::Http {
            endpoint: endpoint.to_string(),
            source,
        })?;
        check_version(&resp)?;
        Ok(resp)
    }

    /// The response body, gunzipped if the server compressed it.
    async fn body(&self, endpoint: &str, resp: Response) -> ClientResult<Bytes> {
        let gzipped = resp
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(names_gzip);
        let body = resp.bytes().await.map_err(|source| ClientError::Http {
            endpoint: endpoint.to_string(),
            source,
        })?;
        if gzipped {
            Ok(Bytes::from(gunzip(&body)?))
        } else {
            Ok(body)
        }
    }

    async fn unexpected(&self, endpoint: &str, resp: Response) -> ClientError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        ClientError::Status {
            endpoint: endpoint.to_string(),
            status,
            body,
        }
    }

    /// `POST /getRefs`. Hashes the server does not have are absent from
    /// the result.
    pub(crate) async fn get_refs(&self, hashes: &[Hash]) -> ClientResult<Vec<Chunk>> {
        let endpoint = endpoints::GET_REFS;
        let url = self.url(endpoint, &[]);
        let form = encode_ref_form(hashes);
        let resp = self
            .send(endpoint, true, || {
                self.request(Method::POST, url.clone())
                    .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                    .header(ACCEPT_ENCODING, GZIP)
                    .body(form.clone())
            })
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(self.unexpected(endpoint, resp).await);
        }
        let chunks = decode_chunks(self.body(endpoint, resp).await?)?;
        debug!(requested = hashes.len(), found = chunks.len(), "getRefs");
        Ok(chunks)
    }

    /// `POST /hasRefs`.
    pub(crate) async fn has_refs(&self, hashes: &[Hash]) -> ClientResult<Vec<(Hash, bool)>> {
        let endpoint = endpoints::HAS_REFS;
        let url = self.url(endpoint, &[]);
        let form = encode_ref_form(hashes);
        let resp = self
            .send(endpoint, true, || {
                self.request(Method::POST, url.clone())
                    .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                    .body(form.clone())
            })
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(self.unexpected(endpoint, resp).await);
        }
        let body = self.body(endpoint, resp).await?;
        Ok(decode_has_response(&String::from_utf8_lossy(&body))?)
    }

    /// `POST /writeValue`, resending whatever the server pushes back on
    /// until it takes everything or the retries run out.
    pub(crate) async fn write_value(&self, hints: &Hints, chunks: &[Chunk]) -> ClientResult<()> {
        let endpoint = endpoints::WRITE_VALUE;
        let url = self.url(endpoint, &[]);
        let mut remaining: Vec<Chunk> = chunks.to_vec();

        for attempt in 0..=self.config.backpressure_retries {
            let body = Bytes::from(gzip(&encode_write_body(hints, &remaining))?);
            let resp = self
                .send(endpoint, false, || {
                    self.request(Method::POST, url.clone())
                        .header(CONTENT_ENCODING, GZIP)
                        .body(body.clone())
                })
                .await?;
            match resp.status() {
                StatusCode::CREATED | StatusCode::OK => {
                    debug!(chunks = remaining.len(), hints = hints.len(), "batch written");
                    return Ok(());
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let named: HashSet<Hash> =
                        decode_hash_list(self.body(endpoint, resp).await?)?.into_iter().collect();
                    remaining.retain(|c| named.contains(&c.hash()));
                    if remaining.is_empty() {
                        return Ok(());
                    }
                    if attempt == self.config.backpressure_retries {
                        break;
                    }
                    let delay = self.config.backoff(attempt);
                    warn!(resend = remaining.len(), attempt = attempt + 1, "backpressure, resending in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                _ => return Err(self.unexpected(endpoint, resp).await),
            }
        }
        Err(ClientError::BackpressureExhausted {
            remaining: remaining.len(),
        })
    }

    /// `GET /root`.
    pub(crate) async fn root(&self) -> ClientResult<Hash> {
        let endpoint = endpoints::ROOT;
        let url = self.url(endpoint, &[]);
        let resp = self
            .send(endpoint, true, || self.request(Method::GET, url.clone()))
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(self.unexpected(endpoint, resp).await);
        }
        let body = self.body(endpoint, resp).await?;
        let text = String::from_utf8_lossy(&body);
        Ok(Hash::parse_or_empty(text.trim()).map_err(cairn_protocol::ProtocolError::from)?)
    }

    /// `POST /root?current=&last=`. `false` means another writer moved the
    /// root first.
    pub(crate) async fn update_root(&self, current: Hash, last: Hash) -> ClientResult<bool> {
        let endpoint = endpoints::ROOT;
        let url = self.url(
            endpoint,
            &[
                (params::CURRENT, current.to_string()),
                (params::LAST, last.to_string()),
            ],
        );
        let resp = self
            .send(endpoint, false, || self.request(Method::POST, url.clone()))
            .await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::CONFLICT => Ok(false),
            _ => Err(self.unexpected(endpoint, resp).await),
        }
    }

    /// `POST /postRefs`.
    pub(crate) async fn post_refs(&self, chunks: &[Chunk]) -> ClientResult<()> {
        let endpoint = endpoints::POST_REFS;
        let url = self.url(endpoint, &[]);
        let body = Bytes::from(gzip(&encode_chunks(chunks))?);
        let resp = self
            .send(endpoint, false, || {
                self.request(Method::POST, url.clone())
                    .header(CONTENT_ENCODING, GZIP)
                    .body(body.clone())
            })
            .await?;
        match resp.status() {
            StatusCode::CREATED | StatusCode::OK => Ok(()),
            _ => Err(self.unexpected(endpoint, resp).await),
        }
    }

    /// `GET /ref/:hash?all=true&exclude=`.
    pub(crate) async fn get_reachable(&self, root: Hash, exclude: Hash) -> ClientResult<Vec<Chunk>> {
        let path = ref_path(&root);
        let url = self.url(
            &path,
            &[
                (params::ALL, "true".to_string()),
                (params::EXCLUDE, exclude.to_string()),
            ],
        );
        let resp = self
            .send(&path, true, || {
                self.request(Method::GET, url.clone())
                    .header(ACCEPT_ENCODING, GZIP)
            })
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(self.unexpected(&path, resp).await);
        }
        Ok(decode_chunks(self.body(&path, resp).await?)?)
    }
}

fn check_version(resp: &Response) -> ClientResult<()> {
    let remote = resp
        .headers()
        .get(VERSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if remote == PROTOCOL_VERSION {
        Ok(())
    } else {
        Err(ClientError::VersionMismatch {
            local: PROTOCOL_VERSION.to_string(),
            remote: remote.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(base: &str) -> Remote {
        Remote::new(ClientConfig::new(base)).unwrap()
    }

    #[test]
    fn url_keeps_base_path_and_query() {
        let r = remote("http://db.example:8000/ns/one?access_token=tok");
        let url = r.url("/root", &[]);
        assert_eq!(url.as_str(), "http://db.example:8000/ns/one/root?access_token=tok");
    }

    #[test]
    fn url_appends_call_parameters() {
        let r = remote("http://db.example:8000/?access_token=tok");
        let h = Hash::of(b"x");
        let url = r.url("/root", &[(params::CURRENT, h.to_string())]);
        assert_eq!(url.path(), "/root");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("access_token".to_string(), "tok".to_string()),
                ("current".to_string(), h.to_string()),
            ]
        );
    }

    #[test]
    fn bad_base_url_is_rejected() {
        assert!(matches!(
            Remote::new(ClientConfig::new("not a url")),
            Err(ClientError::Url(_))
        ));
    }

    #[test]
    fn bad_auth_header_is_rejected() {
        let config = ClientConfig::new("http://localhost").with_auth_header("bad\nvalue");
        assert!(matches!(Remote::new(config), Err(ClientError::InvalidHeader(_))));
    }
}
