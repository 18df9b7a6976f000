use super::ProvenanceGraph;

use std::io::Error;
use std::path::Path;

use async_std::fs::File;
use async_std::prelude::*;

use petgraph::dot::Config;

pub async fn write_file<P: AsRef<Path>>(
    graph: &ProvenanceGraph,
    path: P,
    edge_labels: bool,
) -> Result<(), Error> {
    let config: &[Config] = if edge_labels {
        &[]
    } else {
        &[Config::EdgeNoLabel]
    };
    let dot = format!("{}", graph.get_dot_with_config(config));

    let mut file = File::create(path.as_ref()).await?;
    file.write_all(dot.as_bytes()).await?;
    file.flush().await
}
