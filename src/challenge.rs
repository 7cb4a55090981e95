use clap::ValueEnum;
use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::direction::Direction;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChallengeError {
    #[error("challenge sequence has no symbols")]
    EmptySequence,
    #[error("time per symbol must be a positive number of seconds, got {0}")]
    InvalidTimeBudget(f64),
    #[error("unknown symbol `{0}` (expected up, down, left or right)")]
    UnknownSymbol(String),
    #[error("no wild pokemon known for difficulty `{tier}` in habitat `{habitat}`")]
    NoEncounter { tier: DifficultyTier, habitat: String },
}

/// The arrows to press and how long the player gets for each of them.
///
/// Always holds at least one symbol and a budget of at least one millisecond;
/// an empty challenge is rejected at construction instead of being played.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSequence", into = "RawSequence")]
pub struct ChallengeSequence {
    symbols: Vec<Direction>,
    time_per_symbol: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSequence {
    symbols: Vec<Direction>,
    time_per_symbol_seconds: f64,
}

impl ChallengeSequence {
    pub fn new(symbols: Vec<Direction>, time_per_symbol_secs: f64) -> Result<Self, ChallengeError> {
        if symbols.is_empty() {
            return Err(ChallengeError::EmptySequence);
        }
        if !time_per_symbol_secs.is_finite() || time_per_symbol_secs <= 0.0 {
            return Err(ChallengeError::InvalidTimeBudget(time_per_symbol_secs));
        }
        let millis = (time_per_symbol_secs * 1000.0).round() as u64;
        if millis == 0 {
            return Err(ChallengeError::InvalidTimeBudget(time_per_symbol_secs));
        }

        Ok(Self {
            symbols,
            time_per_symbol: Duration::from_millis(millis),
        })
    }

    /// Parses a comma separated list such as `up,down,left`
    pub fn parse(list: &str, time_per_symbol_secs: f64) -> Result<Self, ChallengeError> {
        let symbols = list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Direction>, _>>()?;
        Self::new(symbols, time_per_symbol_secs)
    }

    /// Random sequence shaped by a difficulty tier
    pub fn generate<R: Rng + ?Sized>(tier: DifficultyTier, rng: &mut R) -> Self {
        let symbols = (0..tier.buttons())
            .map(|_| Direction::ALL[rng.gen_range(0..Direction::ALL.len())])
            .collect();
        Self {
            symbols,
            time_per_symbol: tier.time_per_symbol(),
        }
    }

    pub fn symbols(&self) -> &[Direction] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<Direction> {
        self.symbols.get(idx).copied()
    }

    pub fn time_per_symbol(&self) -> Duration {
        self.time_per_symbol
    }

    pub fn time_per_symbol_secs(&self) -> f64 {
        self.time_per_symbol.as_secs_f64()
    }
}

impl TryFrom<RawSequence> for ChallengeSequence {
    type Error = ChallengeError;

    fn try_from(raw: RawSequence) -> Result<Self, Self::Error> {
        Self::new(raw.symbols, raw.time_per_symbol_seconds)
    }
}

impl From<ChallengeSequence> for RawSequence {
    fn from(seq: ChallengeSequence) -> Self {
        Self {
            time_per_symbol_seconds: seq.time_per_symbol_secs(),
            symbols: seq.symbols,
        }
    }
}

/// A catch attempt as handed to the minigame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub pokemon_id: u32,
    pub pokemon_name: String,
    pub pokemon_sprite_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habitat: Option<String>,
    pub sequence: ChallengeSequence,
}

impl Challenge {
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Picks a wild pokemon of the given tier, optionally restricted to one
    /// habitat, and builds its sequence from the pokemon's own stats total.
    pub fn wild<R: Rng + ?Sized>(
        tier: DifficultyTier,
        habitat: Option<&str>,
        rng: &mut R,
    ) -> Result<Self, ChallengeError> {
        let candidates: Vec<&WildPokemon> = WILD_POKEMON
            .iter()
            .filter(|p| DifficultyTier::for_stats_total(p.stats_total) == tier)
            .filter(|p| habitat.map_or(true, |h| p.habitat.eq_ignore_ascii_case(h)))
            .collect();
        let pokemon = candidates
            .choose(rng)
            .ok_or_else(|| ChallengeError::NoEncounter {
                tier,
                habitat: habitat.unwrap_or(ANY_HABITAT).to_string(),
            })?;
        let sequence =
            ChallengeSequence::generate(DifficultyTier::for_stats_total(pokemon.stats_total), rng);

        Ok(pokemon.challenge(sequence))
    }

    /// Ad-hoc challenge with no pokemon data behind it
    pub fn custom(sequence: ChallengeSequence) -> Self {
        Self {
            pokemon_id: 0,
            pokemon_name: "missingno".to_string(),
            pokemon_sprite_url: String::new(),
            habitat: None,
            sequence,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DifficultyTier {
    Weak,
    Easy,
    #[default]
    Medium,
    Hard,
    Legendary,
    Mythical,
}

impl DifficultyTier {
    pub const ALL: [DifficultyTier; 6] = [
        DifficultyTier::Weak,
        DifficultyTier::Easy,
        DifficultyTier::Medium,
        DifficultyTier::Hard,
        DifficultyTier::Legendary,
        DifficultyTier::Mythical,
    ];

    pub fn for_stats_total(stats_total: u32) -> Self {
        match stats_total {
            0..=300 => DifficultyTier::Weak,
            301..=400 => DifficultyTier::Easy,
            401..=500 => DifficultyTier::Medium,
            501..=600 => DifficultyTier::Hard,
            601..=720 => DifficultyTier::Legendary,
            _ => DifficultyTier::Mythical,
        }
    }

    pub fn buttons(self) -> usize {
        match self {
            DifficultyTier::Weak => 3,
            DifficultyTier::Easy => 4,
            DifficultyTier::Medium => 5,
            DifficultyTier::Hard => 6,
            DifficultyTier::Legendary => 7,
            DifficultyTier::Mythical => 8,
        }
    }

    pub fn time_per_symbol(self) -> Duration {
        Duration::from_millis(match self {
            DifficultyTier::Weak => 1500,
            DifficultyTier::Easy => 1200,
            DifficultyTier::Medium => 1000,
            DifficultyTier::Hard => 800,
            DifficultyTier::Legendary => 600,
            DifficultyTier::Mythical => 500,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WildPokemon {
    pub id: u32,
    pub name: &'static str,
    pub stats_total: u32,
    pub habitat: &'static str,
}

impl WildPokemon {
    pub fn sprite_url(&self) -> String {
        format!(
            "https://raw.githubusercontent.com/PokeAPI/sprites/master/sprites/pokemon/{}.png",
            self.id
        )
    }

    fn challenge(&self, sequence: ChallengeSequence) -> Challenge {
        Challenge {
            pokemon_id: self.id,
            pokemon_name: self.name.to_string(),
            pokemon_sprite_url: self.sprite_url(),
            habitat: Some(self.habitat.to_string()),
            sequence,
        }
    }
}

/// Habitat filter value that matches every habitat
pub const ANY_HABITAT: &str = "any";

/// Turns a user supplied habitat name into a filter; `any` or blank means no filter
pub fn habitat_filter(raw: &str) -> Option<String> {
    let name = raw.trim().to_ascii_lowercase();
    if name.is_empty() || name == ANY_HABITAT {
        None
    } else {
        Some(name)
    }
}

/// Distinct habitats of the wild roster, sorted
pub fn habitats() -> Vec<&'static str> {
    WILD_POKEMON.iter().map(|p| p.habitat).sorted().dedup().collect()
}

/// Tiers with at least one wild pokemon living in `habitat`
pub fn tiers_in_habitat(habitat: &str) -> Vec<DifficultyTier> {
    DifficultyTier::ALL
        .into_iter()
        .filter(|&tier| {
            WILD_POKEMON.iter().any(|p| {
                p.habitat == habitat && DifficultyTier::for_stats_total(p.stats_total) == tier
            })
        })
        .collect()
}

const fn wild(id: u32, name: &'static str, stats_total: u32, habitat: &'static str) -> WildPokemon {
    WildPokemon {
        id,
        name,
        stats_total,
        habitat,
    }
}

pub const WILD_POKEMON: &[WildPokemon] = &[
    wild(10, "caterpie", 195, "forest"),
    wild(16, "pidgey", 251, "forest"),
    wild(19, "rattata", 253, "grassland"),
    wild(129, "magikarp", 200, "waters-edge"),
    wild(1, "bulbasaur", 318, "grassland"),
    wild(4, "charmander", 309, "mountain"),
    wild(7, "squirtle", 314, "waters-edge"),
    wild(25, "pikachu", 320, "forest"),
    wild(133, "eevee", 325, "urban"),
    wild(18, "pidgeot", 479, "forest"),
    wild(26, "raichu", 485, "forest"),
    wild(42, "golbat", 455, "cave"),
    wild(93, "haunter", 405, "cave"),
    wild(59, "arcanine", 555, "grassland"),
    wild(130, "gyarados", 540, "waters-edge"),
    wild(131, "lapras", 535, "sea"),
    wild(143, "snorlax", 540, "mountain"),
    wild(149, "dragonite", 600, "waters-edge"),
    wild(150, "mewtwo", 680, "rare"),
    wild(249, "lugia", 680, "rare"),
    wild(250, "ho-oh", 680, "rare"),
    wild(382, "kyogre", 670, "sea"),
    wild(10043, "mewtwo-mega-x", 780, "rare"),
    wild(10077, "kyogre-primal", 770, "sea"),
    wild(10079, "rayquaza-mega", 780, "rare"),
];
