use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Url};
use taskdeck_core::{EntityKind, Endpoint, FlavorList, Snapshot};

use crate::error::{DispatchError, FetchError};
use crate::fetcher::FetchRequest;

/// The server as seen by the console: a reachability probe, snapshot reads
/// and fire-and-forget writes.
pub trait Backend: Send + Sync + 'static {
    fn ping(&self) -> impl Future<Output = Result<(), FetchError>> + Send;

    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<Snapshot, FetchError>> + Send;

    fn send(&self, endpoint: &Endpoint) -> impl Future<Output = Result<(), DispatchError>> + Send;

    /// Instance types new workers can be launched on.
    fn flavors(&self) -> impl Future<Output = Result<FlavorList, FetchError>> + Send;
}

#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(server_url: &str) -> Result<Self, FetchError> {
        let mut raw = server_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base = Url::parse(&raw).map_err(|e| FetchError::Url(format!("{raw}: {e}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url<K, V>(&self, path: &str, params: &[(K, V)]) -> Result<Url, String>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| format!("{path}: {e}"))?;
        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (k, v) in params {
                query.append_pair(k.as_ref(), v.as_ref());
            }
        }
        Ok(url)
    }
}

impl Backend for HttpBackend {
    async fn ping(&self) -> Result<(), FetchError> {
        let url = self
            .url::<&str, &str>("/ui/ping", &[])
            .map_err(FetchError::Url)?;
        self.client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(FetchError::Unreachable)?;
        Ok(())
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Snapshot, FetchError> {
        let url = self
            .url(request.path(), &request.query_pairs())
            .map_err(FetchError::Url)?;
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(Snapshot::decode(request.kind, &body)?)
    }

    async fn send(&self, endpoint: &Endpoint) -> Result<(), DispatchError> {
        let url = self
            .url(endpoint.path, &endpoint.params)
            .map_err(DispatchError::Url)?;
        self.client.get(url).send().await?.error_for_status()?;
        Ok(())
    }

    async fn flavors(&self) -> Result<FlavorList, FetchError> {
        let url = self
            .url::<&str, &str>("/ui/flavors/", &[])
            .map_err(FetchError::Url)?;
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(FlavorList::decode(&body)?)
    }
}

/// Read path for a snapshot kind.
pub fn read_path(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Jobs => "/ui/jobs",
        _ => "/ui/get/",
    }
}
