use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::{json, Value};
use tracing::{info, warn};

use linkpull_core::{EndpointSpec, ErrorHistogram, FetchError, Registry, ResourceFailure};
use linkpull_http::{get_with_fallback, ApiClient, Params};
use linkpull_state::{ArchiveContent, ArchiveWriter};

use crate::runner::{archive, archive_time};
use crate::summary::print_failures;

/// Split `key=value` pairs into path parameters (named in the template) and query.
pub fn split_params(spec: &EndpointSpec, pairs: &[(String, String)]) -> (Params, Params) {
    let names = spec.placeholders();
    let mut path = Params::new();
    let mut query = Params::new();
    for (key, value) in pairs {
        if names.contains(key) {
            path.insert(key.clone(), value.clone());
        } else {
            query.insert(key.clone(), value.clone());
        }
    }
    (path, query)
}

/// One GET of one endpoint, wrapped for the archive.
pub fn extract_one<C: ApiClient + ?Sized>(
    client: &C,
    spec: &EndpointSpec,
    pairs: &[(String, String)],
) -> Result<Value, FetchError> {
    let (path_params, query) = split_params(spec, pairs);
    let (body, path) = get_with_fallback(client, spec, &path_params, &query)?;
    Ok(json!({
        "endpoint": spec.name,
        "path": path,
        "path_params": path_params,
        "query": query,
        "fetched_at": chrono::Utc::now().to_rfc3339(),
        "data": body,
    }))
}

pub fn cmd_extract<C: ApiClient + ?Sized>(
    client: &C,
    registry: &Registry,
    writer: &ArchiveWriter,
    name: Option<&str>,
    params: &[(String, String)],
    all: bool,
) -> Result<()> {
    let now = archive_time();

    if !all {
        let name = name.context("Endpoint name is required without --all")?;
        let spec = registry.get(name)?;
        let missing: Vec<String> = spec
            .placeholders()
            .into_iter()
            .filter(|p| !params.iter().any(|(k, _)| k == p))
            .collect();
        if !missing.is_empty() {
            anyhow::bail!(
                "Endpoint '{}' needs path parameters: {}\n\nHint: pass them as --param {}=<value>",
                spec.name,
                missing.join(", "),
                missing[0]
            );
        }

        let document = extract_one(client, spec, params)
            .with_context(|| format!("Failed to fetch endpoint '{}'", spec.name))?;
        archive(writer, &format!("extract/{}", spec.category), &spec.name, &ArchiveContent::Json(document), now)?;
        return Ok(());
    }

    let (plain, parameterized) = registry.partition();
    info!(endpoints = plain.len(), skipped = parameterized.len(), "Extracting all endpoints without parameters");

    let mut failures = Vec::new();
    for spec in &plain {
        println!("{} {} ({})", "Fetching".cyan(), spec.name, spec.path);
        match extract_one(client, spec, params) {
            Ok(document) => {
                archive(writer, &format!("extract/{}", spec.category), &spec.name, &ArchiveContent::Json(document), now)?;
            }
            Err(err) => {
                warn!(endpoint = %spec.name, kind = %err.kind(), error = %err, "Endpoint failed, continuing");
                failures.push(ResourceFailure {
                    resource: spec.name.clone(),
                    kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }
    }

    if !parameterized.is_empty() {
        println!(
            "\nSkipped {} endpoints that need path parameters (see `linkpull list`):",
            parameterized.len()
        );
        for spec in &parameterized {
            println!("  {:<32} {}", spec.name, spec.placeholders().join(", ").dimmed());
        }
    }

    let histogram: ErrorHistogram = failures.iter().collect();
    println!("\nFetched {}/{} endpoints", plain.len() - failures.len(), plain.len());
    print_failures(&failures, &histogram);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkpull_core::ErrorKind;
    use linkpull_http::MockClient;
    use std::fs;
    use tempfile::TempDir;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_split_params() {
        let spec = EndpointSpec::new("x", "/courses/{courseId}/groups/{groupId}", "");
        let (path, query) = split_params(
            &spec,
            &pairs(&[("courseId", "c"), ("groupId", "g"), ("page", "2")]),
        );
        assert_eq!(path.len(), 2);
        assert_eq!(query.get("page").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_extract_one_wraps_body() {
        let registry = Registry::builtin();
        let spec = registry.get("chats-teams").unwrap();
        let client = MockClient::new();
        client.respond("/chats/teams", json!([{"id": "t1"}]));

        let doc = extract_one(&client, spec, &[]).unwrap();
        assert_eq!(doc["endpoint"], json!("chats-teams"));
        assert_eq!(doc["path"], json!("/chats/teams"));
        assert_eq!(doc["data"], json!([{"id": "t1"}]));
    }

    #[test]
    fn test_extract_all_continues_past_failures() {
        let mut registry = Registry::new();
        registry.register(EndpointSpec::new("a", "/a", "")).unwrap();
        registry.register(EndpointSpec::new("b", "/b", "")).unwrap();
        registry.register(EndpointSpec::new("c", "/c/{id}", "")).unwrap();

        let client = MockClient::new();
        client.fail_status("/a", 403);
        client.respond("/b", json!({"ok": true}));

        let dir = TempDir::new().unwrap();
        let writer = ArchiveWriter::new(dir.path());
        cmd_extract(&client, &registry, &writer, None, &[], true).unwrap();

        let written: Vec<String> = fs::read_dir(dir.path().join("extract/b"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(written.len(), 1);
        assert!(written[0].starts_with("b_"));
        assert_eq!(client.total_requests(), 2, "parameterized endpoint is not requested");
    }

    #[test]
    fn test_extract_single_requires_params() {
        let registry = Registry::builtin();
        let client = MockClient::new();
        let dir = TempDir::new().unwrap();
        let writer = ArchiveWriter::new(dir.path());

        let err = cmd_extract(&client, &registry, &writer, Some("course-details"), &[], false)
            .unwrap_err();
        assert!(err.to_string().contains("courseId"));
        assert_eq!(client.total_requests(), 0);
    }

    #[test]
    fn test_extract_single_surfaces_fetch_error() {
        let registry = Registry::builtin();
        let client = MockClient::new();
        client.fail_status("/chats/teams", 403);
        let dir = TempDir::new().unwrap();
        let writer = ArchiveWriter::new(dir.path());

        let err = cmd_extract(&client, &registry, &writer, Some("chats-teams"), &[], false)
            .unwrap_err();
        let fetch = err.downcast_ref::<FetchError>().unwrap();
        assert_eq!(fetch.kind(), ErrorKind::PermissionDenied);
    }
}
