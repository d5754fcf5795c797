use anyhow::{anyhow, ensure, Context as _, Result};
use crc::{Crc, CRC_32_BZIP2};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Placeholder written into station exports for ids that could not be
/// translated. Rows carrying it are skipped by the merge.
pub const UNMATCHED_SENTINEL: &str = "No Match";

/// Card number as printed on a point-of-sale card.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CardId(String);

impl CardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn is_unmatched(&self) -> bool {
        self.0 == UNMATCHED_SENTINEL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Member id used by the weighing-scale service.
///
/// External systems hand this to us in several spellings: `"1820210565"`,
/// `"0001820210565"` (card readers pad with zeros) and `"1820210565.0"`
/// (spreadsheet cells typed as float). All of them must land on the same
/// integer key, so conversion happens exactly once, here.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScaleId(i64);

impl ScaleId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        ensure!(!trimmed.is_empty(), "empty scale id");
        if let Ok(id) = trimmed.parse::<i64>() {
            return Ok(Self(id));
        }
        let as_float: f64 = trimmed
            .parse()
            .with_context(|| format!("scale id {trimmed:?} is not numeric"))?;
        Self::from_f64(as_float)
    }

    pub fn from_f64(value: f64) -> Result<Self> {
        ensure!(
            value.is_finite() && value.fract() == 0.0,
            "scale id {value} is not an integer"
        );
        Ok(Self(value as i64))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ScaleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize)]
enum RosterCache {
    V1(Vec<(CardId, ScaleId)>),
}

#[derive(Deserialize)]
struct RosterRow {
    card_id: String,
    scale_id: String,
}

/// Bidirectional card id / scale id mapping, built once from the roster table.
///
/// Forward and reverse maps are exact inverses: a roster row whose card or
/// scale id was already taken is dropped entirely rather than half-inserted.
#[derive(Debug, Clone, Default)]
#[cfg_attr(test, derive(PartialEq))]
pub struct IdTranslator {
    forward: HashMap<CardId, ScaleId>,
    reverse: HashMap<ScaleId, CardId>,
}

impl IdTranslator {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (CardId, ScaleId)>) -> Self {
        let mut translator = Self::default();
        for (card, scale) in pairs {
            if translator.reverse.contains_key(&scale) {
                log::warn!("Ignoring duplicate roster mapping for scale id {scale}");
                continue;
            }
            match translator.forward.entry(card) {
                Entry::Occupied(entry) => {
                    log::warn!("Ignoring duplicate roster mapping for card {}", entry.key());
                }
                Entry::Vacant(entry) => {
                    translator.reverse.insert(scale, entry.key().clone());
                    entry.insert(scale);
                }
            }
        }
        translator
    }

    pub fn from_roster_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open roster file {}", path.display()))?;
        let headers = reader.headers()?.clone();
        for column in ["card_id", "scale_id"] {
            ensure!(
                headers.iter().any(|header| header == column),
                "Roster file {} is missing the {column:?} column",
                path.display()
            );
        }
        let mut pairs = Vec::new();
        for (index, row) in reader.deserialize::<RosterRow>().enumerate() {
            let row = row.with_context(|| format!("Roster row {}", index + 2))?;
            let scale = ScaleId::parse(&row.scale_id)
                .with_context(|| format!("Roster row {}", index + 2))?;
            pairs.push((CardId::new(row.card_id), scale));
        }
        Ok(Self::from_pairs(pairs))
    }

    /// Use the binary cache if it is present and readable, otherwise rebuild
    /// from the roster and refresh the cache. Both paths yield the same table.
    pub fn load_or_build(roster_path: &Path, cache_path: &Path) -> Result<Self> {
        match Self::load_cache(cache_path) {
            Ok(Some(translator)) => return Ok(translator),
            Ok(None) => {}
            Err(err) => log::warn!(
                "Ignoring unreadable roster cache {}: {err:#}",
                cache_path.display()
            ),
        }
        let translator = Self::from_roster_csv(roster_path)?;
        if let Err(err) = translator.save_cache(cache_path) {
            log::warn!("Failed to write roster cache {}: {err:#}", cache_path.display());
        }
        Ok(translator)
    }

    /// Returns Ok(None) if the cache file doesn't exist yet
    pub fn load_cache(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content_compressed = std::fs::read(path)?;
        let content = zstd::bulk::decompress(
            &content_compressed,
            content_compressed.len().max(16 * 1024 * 1024),
        )?;
        let crc = crc();
        let (parsed, remaining): (RosterCache, &[u8]) =
            postcard::take_from_bytes_crc32(&content, crc.digest())?;
        ensure!(0 == remaining.len(), "Cache file had extra bytes");
        let RosterCache::V1(pairs) = parsed;
        Ok(Some(Self::from_pairs(pairs)))
    }

    pub fn save_cache(&self, path: &Path) -> Result<()> {
        let mut pairs: Vec<(CardId, ScaleId)> = self
            .forward
            .iter()
            .map(|(card, scale)| (card.clone(), *scale))
            .collect();
        pairs.sort();

        let crc = crc();
        let content = postcard::to_stdvec_crc32(&RosterCache::V1(pairs), crc.digest())?;
        let content_compressed =
            zstd::bulk::compress(&content, zstd::DEFAULT_COMPRESSION_LEVEL)?;

        // First write to a temporary file so a failed write can't corrupt an
        // existing cache
        let filename = path
            .file_name()
            .ok_or_else(|| anyhow!("Path has no filename"))?
            .to_str()
            .ok_or_else(|| anyhow!("Filename isn't valid utf-8"))?;
        let tmppath = path.with_file_name(format!("{}.temp", filename));
        std::fs::write(&tmppath, content_compressed)?;
        std::fs::rename(&tmppath, path)?;

        Ok(())
    }

    pub fn forward(&self, card: &CardId) -> Option<ScaleId> {
        self.forward.get(card).copied()
    }

    pub fn reverse(&self, scale: ScaleId) -> Option<&CardId> {
        self.reverse.get(&scale)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

fn crc() -> Crc<u32> {
    Crc::<u32>::new(&CRC_32_BZIP2)
}
