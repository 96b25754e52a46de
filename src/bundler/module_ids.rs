//! Runtime module ids

use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

use crate::config::ModuleIdStrategy;

use super::{ModuleGraph, ModuleId};

const HASHED_ID_LENGTH: usize = 4;

/// The id each module is registered under in emitted code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleIds(Vec<String>);

impl ModuleIds {
    pub fn assign(graph: &ModuleGraph, strategy: ModuleIdStrategy) -> Self {
        match strategy {
            ModuleIdStrategy::Named => Self(
                graph
                    .modules()
                    .map(|(_, module)| module.ident.clone())
                    .collect(),
            ),
            ModuleIdStrategy::Hashed => Self::hashed(graph),
        }
    }

    /// Short base64 digests of the identifiers. On collision the id grows
    /// one character at a time; identifiers are visited in sorted order so
    /// the outcome does not depend on discovery order.
    fn hashed(graph: &ModuleGraph) -> Self {
        let mut by_ident: Vec<(&str, ModuleId)> = graph
            .modules()
            .map(|(id, module)| (module.ident.as_str(), id))
            .collect();
        by_ident.sort();

        let mut ids = vec![String::new(); graph.len()];
        let mut taken = HashSet::new();
        for (ident, id) in by_ident {
            let digest = STANDARD.encode(Sha256::digest(ident.as_bytes()));
            let mut len = HASHED_ID_LENGTH;
            while len < digest.len() && taken.contains(&digest[..len]) {
                len += 1;
            }
            let short = digest[..len].to_string();
            taken.insert(short.clone());
            ids[id] = short;
        }

        Self(ids)
    }

    pub fn get(&self, id: ModuleId) -> &str {
        self.0.get(id).map(String::as_str).unwrap_or_default()
    }
}
