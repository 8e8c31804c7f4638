use crate::chemistry::species::{Reaction, Side, Species};
use crate::core::error::Result;
use crate::core::structure::Molecule;
use crate::io::reaction::ReactionRecord;
use log::{debug, info};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// First-seen representative of a set of isomorphic species.
#[derive(Debug, Clone)]
pub struct UniqueSpecies {
    pub species: Species,
    /// Lookup key shared by every species isomorphic to this one.
    pub key: String,
    pub geometry: Molecule,
}

/// A reaction whose species have been matched to their unique
/// representatives and minima directories.
#[derive(Debug, Clone)]
pub struct ResolvedReaction {
    pub reaction: Reaction,
    pub reactant_keys: Vec<String>,
    pub product_keys: Vec<String>,
    pub reactant_minima: Vec<Vec<PathBuf>>,
    pub product_minima: Vec<Vec<PathBuf>>,
    pub side: Side,
}

impl ResolvedReaction {
    /// `r1+r2_p1+p2`, built from each species' own symbols as written in
    /// the document. The keys stay those of the first-seen representative
    /// and only select minima directories.
    pub fn name(&self) -> String {
        let side = |species: &[Species]| species.iter().map(|s| s.symbols()).collect::<Vec<_>>().join("+");
        format!("{}_{}", side(&self.reaction.reactants), side(&self.reaction.products))
    }

    /// Species the placer starts from: the first one on the smaller side.
    pub fn enumeration_species(&self) -> &Species {
        &self.reaction.species(self.side)[0]
    }

    pub fn keys(&self, side: Side) -> &[String] {
        match side {
            Side::Reactants => &self.reactant_keys,
            Side::Products => &self.product_keys,
        }
    }
}

/// Resolves reaction records into species with stable identities.
///
/// One resolver is owned by one pipeline run; its caches never outlive it.
pub struct SpeciesResolver {
    facet_path: PathBuf,
    minima_cache: HashMap<String, Vec<PathBuf>>,
    seen: Vec<UniqueSpecies>,
}

impl SpeciesResolver {
    pub fn new(facet_path: impl Into<PathBuf>) -> Self {
        Self {
            facet_path: facet_path.into(),
            minima_cache: HashMap::new(),
            seen: Vec::new(),
        }
    }

    pub fn unique_species(&self) -> &[UniqueSpecies] {
        &self.seen
    }

    /// Index of the representative isomorphic to `species`, registering
    /// it (and embedding its geometry) when it is new.
    pub fn register(&mut self, species: &Species) -> Result<usize> {
        if let Some(idx) = self.seen.iter().position(|u| u.species.is_isomorphic(species)) {
            return Ok(idx);
        }
        let geometry = species.embed()?;
        let key = species.symbols();
        debug!("New unique species {} ({} atoms)", key, species.len());
        self.seen.push(UniqueSpecies {
            species: species.clone(),
            key,
            geometry,
        });
        Ok(self.seen.len() - 1)
    }

    pub fn representative(&self, species: &Species) -> Option<&UniqueSpecies> {
        self.seen.iter().find(|u| u.species.is_isomorphic(species))
    }

    /// Files under `<facet>/minima_unique/<key>`, sorted; empty when the
    /// directory does not exist. Cached per key.
    pub fn minima_for(&mut self, key: &str) -> Result<Vec<PathBuf>> {
        if let Some(cached) = self.minima_cache.get(key) {
            return Ok(cached.clone());
        }
        let dir = self.facet_path.join("minima_unique").join(key);
        let listing = list_sorted(&dir)?;
        self.minima_cache.insert(key.to_string(), listing.clone());
        Ok(listing)
    }

    pub fn resolve(&mut self, record: &ReactionRecord) -> Result<ResolvedReaction> {
        let reaction = record.to_reaction()?;
        self.resolve_reaction(reaction)
    }

    pub fn resolve_reaction(&mut self, reaction: Reaction) -> Result<ResolvedReaction> {
        let mut reactant_keys = Vec::with_capacity(reaction.reactants.len());
        let mut reactant_minima = Vec::with_capacity(reaction.reactants.len());
        for species in &reaction.reactants {
            let idx = self.register(species)?;
            let key = self.seen[idx].key.clone();
            reactant_minima.push(self.minima_for(&key)?);
            reactant_keys.push(key);
        }

        let mut product_keys = Vec::with_capacity(reaction.products.len());
        let mut product_minima = Vec::with_capacity(reaction.products.len());
        for species in &reaction.products {
            let idx = self.register(species)?;
            let key = self.seen[idx].key.clone();
            product_minima.push(self.minima_for(&key)?);
            product_keys.push(key);
        }

        let side = reaction.side();
        match side {
            Side::Reactants => info!("Reactant structure will be used to estimate TS"),
            Side::Products => info!("Products will be used to estimate TS"),
        }

        Ok(ResolvedReaction {
            reaction,
            reactant_keys,
            product_keys,
            reactant_minima,
            product_minima,
            side,
        })
    }
}

fn list_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut entries = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}
