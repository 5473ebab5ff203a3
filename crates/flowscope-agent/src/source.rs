use anyhow::{Context, Result};
use flowscope_core::{Address, FlowRecord, LinkKey, LinkRecord, NodeRecord};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

pub const NODES_FILE: &str = "nodes.json";
pub const LINKS_FILE: &str = "links.json";
pub const LINK_STATS_FILE: &str = "link_stats.json";
pub const FLOWS_FILE: &str = "flows.json";

/// Per-link counters published separately from the link list.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkStat {
    pub source: Address,
    pub target: Address,
    #[serde(default)]
    pub bandwidth: Option<u64>,
    #[serde(default)]
    pub utilization: Option<f32>,
    #[serde(default)]
    pub up: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct Sample {
    pub nodes: Vec<NodeRecord>,
    pub links: Vec<LinkRecord>,
    pub flows: Vec<FlowRecord>,
}

/// Directory that an external collector keeps refreshed with JSON dumps.
#[derive(Debug, Clone)]
pub struct DirSource {
    dir: PathBuf,
}

impl DirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Runs the four lookups concurrently and joins them into one sample.
    pub async fn fetch(&self) -> Result<Sample> {
        let (nodes, links, stats, flows) = tokio::try_join!(
            read_json::<Vec<NodeRecord>>(self.dir.join(NODES_FILE)),
            read_json::<Vec<LinkRecord>>(self.dir.join(LINKS_FILE)),
            read_optional_json::<Vec<LinkStat>>(self.dir.join(LINK_STATS_FILE)),
            read_optional_json::<Vec<FlowRecord>>(self.dir.join(FLOWS_FILE)),
        )?;

        Ok(Sample {
            nodes,
            links: merge_link_stats(links, stats),
            flows,
        })
    }
}

async fn read_json<T: DeserializeOwned>(path: PathBuf) -> Result<T> {
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("decode {}", path.display()))
}

async fn read_optional_json<T: DeserializeOwned + Default>(path: PathBuf) -> Result<T> {
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            serde_json::from_slice(&bytes).with_context(|| format!("decode {}", path.display()))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(T::default()),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}

pub fn merge_link_stats(mut links: Vec<LinkRecord>, stats: Vec<LinkStat>) -> Vec<LinkRecord> {
    if stats.is_empty() {
        return links;
    }
    let by_key: HashMap<LinkKey, LinkStat> = stats
        .into_iter()
        .map(|s| (LinkKey::new(s.source.clone(), s.target.clone()), s))
        .collect();

    for link in &mut links {
        let Some(stat) = by_key.get(&link.key()) else {
            continue;
        };
        if let Some(bandwidth) = stat.bandwidth {
            link.bandwidth = bandwidth;
        }
        if let Some(utilization) = stat.utilization {
            link.utilization = utilization.clamp(0.0, 100.0);
        }
        if let Some(up) = stat.up {
            link.up = up;
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn stat(source: &str, target: &str, utilization: f32) -> LinkStat {
        LinkStat {
            source: Address::from(source),
            target: Address::from(target),
            bandwidth: Some(1_000_000_000),
            utilization: Some(utilization),
            up: None,
        }
    }

    #[test]
    fn stats_merge_by_direction() {
        let links = vec![
            LinkRecord::new("10.0.0.1", "10.0.0.2"),
            LinkRecord::new("10.0.0.2", "10.0.0.1"),
        ];
        let merged = merge_link_stats(links, vec![stat("10.0.0.2", "10.0.0.1", 40.0)]);
        assert_eq!(merged[0].utilization, 0.0);
        assert_eq!(merged[1].utilization, 40.0);
        assert_eq!(merged[1].bandwidth, 1_000_000_000);
        assert!(merged[1].up);
    }

    #[test]
    fn utilization_is_clamped() {
        let links = vec![LinkRecord::new("10.0.0.1", "10.0.0.2")];
        let merged = merge_link_stats(links, vec![stat("10.0.0.1", "10.0.0.2", 180.0)]);
        assert_eq!(merged[0].utilization, 100.0);
    }

    #[tokio::test]
    async fn fetch_joins_all_files() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(NODES_FILE),
            r#"[{"address":"10.0.0.1","device_id":1},{"address":"10.0.0.2","device_id":2}]"#,
        )
        .expect("write nodes");
        std::fs::write(
            dir.path().join(LINKS_FILE),
            r#"[{"source":"10.0.0.1","target":"10.0.0.2"}]"#,
        )
        .expect("write links");
        std::fs::write(
            dir.path().join(LINK_STATS_FILE),
            r#"[{"source":"10.0.0.1","target":"10.0.0.2","utilization":12.5}]"#,
        )
        .expect("write stats");
        std::fs::write(
            dir.path().join(FLOWS_FILE),
            r#"[{"src":"10.0.0.1","dst":"10.0.0.2","src_port":1,"dst_port":2,"protocol":6,"path":["1","2"],"rate":9.0}]"#,
        )
        .expect("write flows");

        let sample = DirSource::new(dir.path()).fetch().await.expect("fetch");

        assert_eq!(sample.nodes.len(), 2);
        assert_eq!(sample.links[0].utilization, 12.5);
        assert_eq!(sample.flows[0].path, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn optional_files_may_be_missing() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join(NODES_FILE), "[]").expect("write nodes");
        std::fs::write(dir.path().join(LINKS_FILE), "[]").expect("write links");

        let sample = DirSource::new(dir.path()).fetch().await.expect("fetch");

        assert!(sample.flows.is_empty());
    }

    #[tokio::test]
    async fn missing_links_fail_the_sample() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join(NODES_FILE), "[]").expect("write nodes");

        assert!(DirSource::new(dir.path()).fetch().await.is_err());
    }
}
