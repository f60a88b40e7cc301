//
// Copyright (c) The Fibbing Controller Contributors
//
// SPDX-License-Identifier: MIT
//

//! Loads the operator-supplied forwarding requirements from a JSON file: a
//! map of destination prefix to a list of `[from, to]` DAG edges, where each
//! endpoint is either a router address or the literal `"dest"`.
//!
//! ```json
//! {
//!   "198.51.100.0/24": [["10.0.0.1", "10.0.0.2"], ["10.0.0.2", "dest"]]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use fibbing_solver::{Dag, DagNode, Requirement};
use fibbing_utils::RouterId;
use ipnetwork::Ipv4Network;
use serde_json::Value;

use crate::error::Error;

/// Loads requirements from `path`, logging and falling back to an empty set
/// on any error. A controller with no requirements still forwards LSAs and
/// serves the northbound surface; it simply never emits fake LSAs.
pub fn load(path: impl AsRef<Path>) -> Vec<Requirement> {
    let path = path.as_ref();
    match try_load(path) {
        Ok(requirements) => requirements,
        Err(error) => {
            error.log();
            Vec::new()
        }
    }
}

fn try_load(path: &Path) -> Result<Vec<Requirement>, Error> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::RequirementsFile(path.display().to_string(), e))?;
    let root: HashMap<String, Vec<[String; 2]>> = serde_json::from_str(&text)
        .or_else(|_| parse_loosely(&text, path))?;

    let mut requirements = Vec::with_capacity(root.len());
    for (prefix, edges) in root {
        let prefix: Ipv4Network = prefix
            .parse()
            .map_err(|_| Error::RequirementsFormat(path.display().to_string()))?;
        let mut dag = Dag::new();
        for [from, to] in edges {
            let from = parse_node(&from, path)?;
            let to = parse_node(&to, path)?;
            dag.add_edge(from, to);
        }
        requirements.push(Requirement { prefix, dag });
    }
    Ok(requirements)
}

/// `serde_json` rejects a top-level map whose values are arrays-of-tuples if
/// any tuple isn't exactly length 2; reparse generically and validate by
/// hand so a single malformed entry doesn't sink the whole file.
fn parse_loosely(
    text: &str,
    path: &Path,
) -> Result<HashMap<String, Vec<[String; 2]>>, Error> {
    let root: HashMap<String, Value> = serde_json::from_str(text)
        .map_err(|_| Error::RequirementsFormat(path.display().to_string()))?;
    let mut out = HashMap::with_capacity(root.len());
    for (prefix, edges) in root {
        let edges = edges
            .as_array()
            .ok_or_else(|| Error::RequirementsFormat(path.display().to_string()))?;
        let mut parsed = Vec::with_capacity(edges.len());
        for edge in edges {
            let pair = edge
                .as_array()
                .filter(|a| a.len() == 2)
                .ok_or_else(|| Error::RequirementsFormat(path.display().to_string()))?;
            let from = pair[0].as_str().ok_or_else(|| Error::RequirementsFormat(path.display().to_string()))?;
            let to = pair[1].as_str().ok_or_else(|| Error::RequirementsFormat(path.display().to_string()))?;
            parsed.push([from.to_owned(), to.to_owned()]);
        }
        out.insert(prefix, parsed);
    }
    Ok(out)
}

fn parse_node(s: &str, path: &Path) -> Result<DagNode, Error> {
    if s.eq_ignore_ascii_case("dest") {
        return Ok(DagNode::Dest);
    }
    s.parse::<RouterId>()
        .map(DagNode::Router)
        .map_err(|_| Error::RequirementsFormat(path.display().to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_single_prefix_dag() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{"198.51.100.0/24": [["10.0.0.1", "10.0.0.2"], ["10.0.0.2", "dest"]]}"#,
        )
        .unwrap();

        let requirements = load(file.path());
        assert_eq!(requirements.len(), 1);
        assert_eq!(requirements[0].prefix, "198.51.100.0/24".parse().unwrap());
        assert!(requirements[0].dag.has_edge(
            DagNode::Router("10.0.0.2".parse::<RouterId>().unwrap()),
            DagNode::Dest
        ));
    }

    #[test]
    fn missing_file_yields_empty_requirements() {
        assert!(load("/nonexistent/path/for/testing.json").is_empty());
    }
}
