use super::config::CliConfig;
use super::dataset::Dataset;
use anyhow::{Context, Result};
use fanout::query::{PointInTimeRef, SearchRequest};
use fanout_cluster::SearchResponse;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Read a search request from a JSON file, or stdin for `-`
pub fn read_request(path: &Path) -> Result<SearchRequest> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
    };
    let request: SearchRequest =
        serde_json::from_str(&content).context("Failed to parse search request")?;
    Ok(request)
}

/// Load the data set, run one search and print the response as JSON.
/// With `point_in_time` the request's indices are pinned first and the
/// search runs against the pinned readers.
pub async fn run_search(
    config: &CliConfig,
    data: &Path,
    request: &Path,
    point_in_time: bool,
    pretty: bool,
) -> Result<()> {
    let search = Dataset::load(data)?.into_search(config)?;
    let mut request = read_request(request)?;

    let pit_id = if point_in_time {
        let id = search.open_point_in_time(&request.indices, None).await?;
        request.indices.clear();
        request.pit = Some(PointInTimeRef {
            id: id.clone(),
            keep_alive_ms: None,
        });
        Some(id)
    } else {
        None
    };

    let result = search.search(request).await;

    if let Some(id) = pit_id {
        let closed = search.close_point_in_time(&id).await?;
        if !closed.succeeded {
            warn!(freed = closed.num_freed, "Some reader contexts could not be released");
        }
    }

    let response = result?;
    info!(
        took_ms = response.took_ms,
        hits = response.hits.len(),
        shards = response.shards.total,
        "Search finished"
    );
    print_response(&response, pretty)
}

fn print_response(response: &SearchResponse, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(response)?
    } else {
        serde_json::to_string(response)?
    };
    println!("{}", out);
    Ok(())
}

/// Check the configuration and, if given, a request file
pub fn run_validate(config: &CliConfig, request: Option<&Path>) -> Result<()> {
    config.validate()?;
    println!("Configuration OK");
    if let Some(path) = request {
        let request = read_request(path)?;
        request.validate()?;
        println!("Request OK ({} index expressions)", request.indices.len());
    }
    Ok(())
}
