use linkpull_core::{
    EndpointSpec, FetchError, FetchRequest, FetchResult, PageSource, Unwrapper,
};
use serde_json::Value;
use tracing::warn;

use crate::client::{ApiClient, Params};

/// GET an endpoint, switching once to its documented fallback on 404.
///
/// Returns the body together with the path template that answered.
pub fn get_with_fallback<C: ApiClient + ?Sized>(
    client: &C,
    spec: &EndpointSpec,
    path_params: &Params,
    query: &Params,
) -> Result<(Value, String), FetchError> {
    match client.get(&spec.path, path_params, query) {
        Ok(body) => Ok((body, spec.path.clone())),
        Err(err) => match &spec.fallback {
            Some(fallback) if err.kind().allows_fallback() => {
                warn!(endpoint = %spec.name, from = %spec.path, to = %fallback, "Endpoint not found, trying fallback");
                let body = client.get(fallback, path_params, query)?;
                Ok((body, fallback.clone()))
            }
            _ => Err(err),
        },
    }
}

/// Serves pages of one endpoint to the paginator.
///
/// A 404 on the first page switches to the endpoint's fallback path for the
/// rest of the run. A 403 never does.
pub struct EndpointSource<'a, C: ApiClient + ?Sized> {
    client: &'a C,
    spec: &'a EndpointSpec,
    path_params: Params,
    unwrapper: Unwrapper,
    active_path: String,
    pages: usize,
}

impl<'a, C: ApiClient + ?Sized> EndpointSource<'a, C> {
    pub fn new(client: &'a C, spec: &'a EndpointSpec) -> Self {
        Self {
            client,
            spec,
            path_params: Params::new(),
            unwrapper: Unwrapper::for_resource(spec.name.clone(), spec.plural_key.as_deref()),
            active_path: spec.path.clone(),
            pages: 0,
        }
    }

    pub fn with_path_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(key.into(), value.into());
        self
    }

    pub fn with_path_params(mut self, params: Params) -> Self {
        self.path_params.extend(params);
        self
    }

    /// The path template that is answering, which may be the fallback.
    pub fn active_path(&self) -> &str {
        &self.active_path
    }

    pub fn used_fallback(&self) -> bool {
        self.active_path != self.spec.path
    }

    fn to_result(&self, body: Value) -> Option<FetchResult> {
        match body {
            Value::Null => None,
            body => Some(self.unwrapper.unwrap(&body)),
        }
    }
}

impl<C: ApiClient + ?Sized> PageSource for EndpointSource<'_, C> {
    fn fetch_page(&mut self, request: &FetchRequest) -> Result<Option<FetchResult>, FetchError> {
        let query = &request.extra_params;
        let body = if self.pages == 0 {
            let (body, path) = get_with_fallback(self.client, self.spec, &self.path_params, query)?;
            self.active_path = path;
            body
        } else {
            self.client.get(&self.active_path, &self.path_params, query)?
        };
        self.pages += 1;
        Ok(self.to_result(body))
    }
}
