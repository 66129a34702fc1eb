//! Fetch interception strategies.

use std::sync::Arc;

use ringside_core::{Error, Partition, Request, Response};

use super::ServiceWorker;
use crate::lifetime::ExtendableEvent;
use crate::partitions::PartitionKind;
use crate::rules::Category;

/// Store a copy of a successful response. Failures are logged and never
/// reach the caller.
///
/// A write landing after activation evicted the partition is dropped.
async fn store(partition: &Partition, request: &Request, response: &Response) {
    if !response.ok() {
        return;
    }
    match partition.put(request, response).await {
        Ok(true) => {}
        Ok(false) => tracing::debug!(url = %request.url, partition = partition.name(), "Partition evicted, write dropped"),
        Err(e) => tracing::warn!(url = %request.url, partition = partition.name(), error = %e, "Cache write failed"),
    }
}

/// Cached response for the request, treating read failures as misses.
async fn lookup(partition: &Partition, request: &Request) -> Option<Response> {
    match partition.match_request(request).await {
        Ok(hit) => hit,
        Err(e) => {
            tracing::warn!(url = %request.url, partition = partition.name(), error = %e, "Cache read failed");
            None
        }
    }
}

impl ServiceWorker {
    /// Answer an intercepted request.
    ///
    /// Until the worker is activated every request goes straight to the
    /// network. Background work such as image revalidation is registered on
    /// `event`.
    pub async fn handle_fetch(&self, request: Request, event: &ExtendableEvent) -> Result<Response, Error> {
        if !self.state().can_intercept_fetch() {
            tracing::debug!(url = %request.url, state = %self.state(), "Not controlling, passing through");
            return self.host.network.fetch(&request).await;
        }

        let category = self.rules.classify(&request);
        tracing::debug!(url = %request.url, ?category, strategy = ?category.strategy(), "Routing fetch");

        match category {
            Category::NonHttp | Category::NeverCache | Category::Default => self.host.network.fetch(&request).await,
            Category::StaticAsset => self.cache_first(&request).await,
            Category::BoxingImage => self.stale_while_revalidate(request, event).await,
            Category::Api => self.network_first(&request).await,
            Category::Navigation => self.navigate(&request).await,
        }
    }

    async fn cache_first(&self, request: &Request) -> Result<Response, Error> {
        let partition = self.partition(PartitionKind::Static);
        if let Some(cached) = lookup(&partition, request).await {
            tracing::debug!(url = %request.url, "Cache hit");
            return Ok(cached);
        }

        tracing::debug!(url = %request.url, "Cache miss");
        let response = self.host.network.fetch(request).await?;
        store(&partition, request, &response).await;
        Ok(response)
    }

    async fn stale_while_revalidate(&self, request: Request, event: &ExtendableEvent) -> Result<Response, Error> {
        let partition = self.partition(PartitionKind::Images);

        if let Some(cached) = lookup(&partition, &request).await {
            tracing::debug!(url = %request.url, "Cache hit, revalidating in background");
            let network = Arc::clone(&self.host.network);
            event.wait_until(async move {
                match network.fetch(&request).await {
                    Ok(fresh) => store(&partition, &request, &fresh).await,
                    Err(e) => tracing::debug!(url = %request.url, error = %e, "Revalidation failed"),
                }
            });
            return Ok(cached);
        }

        tracing::debug!(url = %request.url, "Cache miss");
        let response = self.host.network.fetch(&request).await?;
        store(&partition, &request, &response).await;
        Ok(response)
    }

    /// Network fetch bounded by the network-first timeout.
    async fn fetch_bounded(&self, request: &Request) -> Result<Response, Error> {
        let timeout = self.settings.network_first_timeout;
        match tokio::time::timeout(timeout, self.host.network.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::NetworkTimeout(format!("{}: no response within {}ms", request.url, timeout.as_millis()))),
        }
    }

    async fn network_first(&self, request: &Request) -> Result<Response, Error> {
        let partition = self.partition(PartitionKind::Dynamic);
        match self.fetch_bounded(request).await {
            Ok(response) => {
                store(&partition, request, &response).await;
                Ok(response)
            }
            Err(e) => match lookup(&partition, request).await {
                Some(cached) => {
                    tracing::debug!(url = %request.url, error = %e, "Network failed, serving cached copy");
                    Ok(cached)
                }
                None => Err(e),
            },
        }
    }

    async fn navigate(&self, request: &Request) -> Result<Response, Error> {
        let err = match self.fetch_bounded(request).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        let shell = Request::get(self.settings.offline_shell.clone());
        for candidate in [request, &shell] {
            match self.storage.match_any(candidate).await {
                Ok(Some(cached)) => {
                    tracing::debug!(url = %request.url, served = %candidate.url, error = %err, "Offline navigation");
                    return Ok(cached);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(url = %candidate.url, error = %e, "Cache read failed"),
            }
        }
        Err(err)
    }
}
