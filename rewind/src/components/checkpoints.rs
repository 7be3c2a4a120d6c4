//! Checkpoints are known-good blocks at specific heights, used to seed fresh chain
//! storage close to where a replay needs to begin.
//!
//! The checkpoint file is plain text with one checkpoint per line:
//!
//! ```text
//! # height  unix-time   block hash
//! 0         1477641360  00040fe8ec8471911baa1db1266ea15dd06b4a8a5c453883c000b031973dce08
//! 1000000   1597104195  0000000000b5b4a10df9e5f4c8dcd1aa7c2bfb1a1bd3d92b5ee1d7b9c1c1e4fd
//! ```
//!
//! Heights must be strictly ascending. Blank lines and `#` comments are ignored.

use std::fmt;
use std::io;
use std::path::Path;

use time::OffsetDateTime;
use tracing::{debug, warn};
use zcash_protocol::consensus::BlockHeight;

/// A block hash, stored in the byte order it is written in checkpoint files.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHash(pub [u8; 32]);

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({self})")
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A known-good `(height, timestamp)` pair on the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    height: BlockHeight,
    timestamp: OffsetDateTime,
    /// `None` for the synthetic genesis checkpoint.
    hash: Option<BlockHash>,
}

impl Checkpoint {
    pub fn new(height: BlockHeight, timestamp: OffsetDateTime, hash: BlockHash) -> Self {
        Self {
            height,
            timestamp,
            hash: Some(hash),
        }
    }

    /// The checkpoint used when nothing better is known: replay everything.
    pub fn genesis() -> Self {
        Self {
            height: BlockHeight::from_u32(0),
            timestamp: OffsetDateTime::UNIX_EPOCH,
            hash: None,
        }
    }

    pub fn height(&self) -> BlockHeight {
        self.height
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn hash(&self) -> Option<BlockHash> {
        self.hash
    }

    pub fn is_genesis(&self) -> bool {
        u32::from(self.height) == 0
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            u32::from(self.height),
            self.timestamp.unix_timestamp()
        )?;
        match &self.hash {
            Some(hash) => write!(f, " {hash}"),
            None => write!(f, " genesis"),
        }
    }
}

#[derive(Debug)]
pub enum CheckpointError {
    Io(io::Error),
    Parse { line: usize, reason: String },
    Ordering { line: usize, height: u32, previous: u32 },
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "{e}"),
            CheckpointError::Parse { line, reason } => write!(f, "line {line}: {reason}"),
            CheckpointError::Ordering {
                line,
                height,
                previous,
            } => write!(
                f,
                "line {line}: height {height} does not follow height {previous}"
            ),
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CheckpointError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CheckpointError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// An ordered collection of checkpoints, lowest height first.
#[derive(Clone, Debug, Default)]
pub struct Checkpoints {
    checkpoints: Vec<Checkpoint>,
}

impl Checkpoints {
    /// The input must be sorted by height in strictly ascending order.
    pub fn new(checkpoints: Vec<Checkpoint>) -> Result<Self, CheckpointError> {
        for (i, pair) in checkpoints.windows(2).enumerate() {
            if pair[1].height <= pair[0].height {
                return Err(CheckpointError::Ordering {
                    line: i + 2,
                    height: pair[1].height.into(),
                    previous: pair[0].height.into(),
                });
            }
        }
        Ok(Self { checkpoints })
    }

    /// Reads a checkpoint file from disk.
    pub async fn load_from(path: &Path) -> Result<Self, CheckpointError> {
        let contents = tokio::fs::read_to_string(path).await?;
        let checkpoints = Self::parse(&contents)?;
        debug!(
            path = %path.display(),
            count = checkpoints.len(),
            "Loaded checkpoints"
        );
        Ok(checkpoints)
    }

    pub fn parse(contents: &str) -> Result<Self, CheckpointError> {
        let mut checkpoints: Vec<Checkpoint> = vec![];

        for (index, raw) in contents.lines().enumerate() {
            let line = index + 1;
            let entry = raw.split('#').next().unwrap_or_default().trim();
            if entry.is_empty() {
                continue;
            }

            let parse_err = |reason: &str| CheckpointError::Parse {
                line,
                reason: reason.to_owned(),
            };

            let mut fields = entry.split_whitespace();
            let (Some(height), Some(timestamp), Some(hash), None) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                return Err(parse_err("expected `<height> <timestamp> <hash>`"));
            };

            let height = height
                .parse::<u32>()
                .map(BlockHeight::from_u32)
                .map_err(|_| parse_err("invalid height"))?;
            let timestamp = timestamp
                .parse::<i64>()
                .ok()
                .and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok())
                .ok_or_else(|| parse_err("invalid timestamp"))?;
            let mut hash_bytes = [0; 32];
            hex::decode_to_slice(hash, &mut hash_bytes)
                .map_err(|_| parse_err("invalid block hash"))?;

            if let Some(previous) = checkpoints.last() {
                if height <= previous.height {
                    return Err(CheckpointError::Ordering {
                        line,
                        height: height.into(),
                        previous: previous.height.into(),
                    });
                }
            }

            checkpoints.push(Checkpoint::new(height, timestamp, BlockHash(hash_bytes)));
        }

        Ok(Self { checkpoints })
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.iter()
    }
}

/// Finds the best checkpoint to start a replay from.
///
/// Resolution only ever looks at the loaded collection, so resolving the same target twice
/// yields the same checkpoint.
#[derive(Clone, Debug, Default)]
pub struct CheckpointResolver {
    checkpoints: Checkpoints,
}

impl CheckpointResolver {
    pub fn new(checkpoints: Checkpoints) -> Self {
        Self { checkpoints }
    }

    /// A resolver that knows no checkpoints, and so always answers with genesis.
    pub fn genesis_only() -> Self {
        Self::default()
    }

    /// Loads the checkpoint file at `path`.
    ///
    /// An unreadable or malformed file is not fatal: the resolver degrades to
    /// [`CheckpointResolver::genesis_only`], making every replay a full replay.
    pub async fn load_or_genesis(path: &Path) -> Self {
        match Checkpoints::load_from(path).await {
            Ok(checkpoints) => Self::new(checkpoints),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    "Checkpoints unavailable, replays will start from genesis: {e}"
                );
                Self::genesis_only()
            }
        }
    }

    pub fn checkpoints(&self) -> &Checkpoints {
        &self.checkpoints
    }

    /// Returns the checkpoint with the greatest height strictly below `height`, or
    /// genesis if there is none.
    pub fn resolve_height(&self, height: BlockHeight) -> Checkpoint {
        let index = self
            .checkpoints
            .checkpoints
            .partition_point(|checkpoint| checkpoint.height < height);
        index
            .checked_sub(1)
            .map(|i| self.checkpoints.checkpoints[i])
            .unwrap_or_else(Checkpoint::genesis)
    }

    /// Returns the checkpoint with the greatest height whose block was created strictly
    /// before `time`, or genesis if there is none.
    pub fn resolve_time(&self, time: OffsetDateTime) -> Checkpoint {
        // Timestamps are not guaranteed to be monotonic with height, so scan everything.
        self.checkpoints
            .iter()
            .filter(|checkpoint| checkpoint.timestamp < time)
            .max_by_key(|checkpoint| checkpoint.height)
            .copied()
            .unwrap_or_else(Checkpoint::genesis)
    }
}


#[cfg(test)]
mod tests {
    use std::io::Write;

    use time::Duration;
    use zcash_protocol::consensus::BlockHeight;

    use super::testing::{resolver, time_of};
    use super::{CheckpointError, CheckpointResolver, Checkpoints};

    fn h(height: u32) -> BlockHeight {
        BlockHeight::from_u32(height)
    }

    #[test]
    fn resolves_strictly_below_height() {
        let resolver = resolver(&[100, 200, 300]);

        assert_eq!(resolver.resolve_height(h(250)).height(), h(200));
        assert_eq!(resolver.resolve_height(h(300)).height(), h(200));
        assert_eq!(resolver.resolve_height(h(301)).height(), h(300));
        assert_eq!(resolver.resolve_height(h(100_000)).height(), h(300));
        assert!(resolver.resolve_height(h(50)).is_genesis());
        assert!(resolver.resolve_height(h(100)).is_genesis());
    }

    #[test]
    fn resolves_strictly_before_time() {
        let resolver = resolver(&[100, 200, 300]);

        assert_eq!(resolver.resolve_time(time_of(250)).height(), h(200));
        assert_eq!(resolver.resolve_time(time_of(200)).height(), h(100));
        assert_eq!(
            resolver
                .resolve_time(time_of(200) + Duration::seconds(1))
                .height(),
            h(200)
        );
        assert!(resolver.resolve_time(time_of(10)).is_genesis());
    }

    #[test]
    fn genesis_checkpoint_is_never_below_itself() {
        let resolver = resolver(&[0, 1000, 2000]);
        assert!(resolver.resolve_height(h(0)).is_genesis());
        assert_eq!(resolver.resolve_height(h(1)).height(), h(0));
    }

    #[test]
    fn empty_collection_resolves_to_genesis() {
        let resolver = CheckpointResolver::genesis_only();
        assert!(resolver.resolve_height(h(1_000_000)).is_genesis());
        assert!(resolver.resolve_time(time_of(1_000_000)).is_genesis());
    }

    #[test]
    fn resolution_is_idempotent() {
        let resolver = resolver(&[100, 200, 300]);
        assert_eq!(resolver.resolve_height(h(222)), resolver.resolve_height(h(222)));
        assert_eq!(
            resolver.resolve_time(time_of(222)),
            resolver.resolve_time(time_of(222))
        );
    }

    #[test]
    fn parses_checkpoint_file() {
        let contents = format!(
            "# mainnet\n\n0 1477641360 {}\n419200 1540779337 {}  # sapling\n",
            "00".repeat(32),
            "ab".repeat(32),
        );
        let checkpoints = Checkpoints::parse(&contents).unwrap();
        assert_eq!(checkpoints.len(), 2);

        let last = checkpoints.iter().last().unwrap();
        assert_eq!(last.height(), h(419200));
        assert_eq!(last.timestamp().unix_timestamp(), 1540779337);
        assert_eq!(last.hash().unwrap().to_string(), "ab".repeat(32));
    }

    #[test]
    fn rejects_descending_heights() {
        let contents = format!("10 1 {h}\n5 2 {h}\n", h = "00".repeat(32));
        assert!(matches!(
            Checkpoints::parse(&contents),
            Err(CheckpointError::Ordering {
                line: 2,
                height: 5,
                previous: 10
            })
        ));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(matches!(
            Checkpoints::parse("10 1"),
            Err(CheckpointError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            Checkpoints::parse(&format!("\nten 1 {}", "00".repeat(32))),
            Err(CheckpointError::Parse { line: 2, .. })
        ));
        assert!(matches!(
            Checkpoints::parse("10 1 nothex"),
            Err(CheckpointError::Parse { line: 1, .. })
        ));
    }

    #[tokio::test]
    async fn unreadable_file_degrades_to_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CheckpointResolver::load_or_genesis(&dir.path().join("missing")).await;
        assert!(resolver.checkpoints().is_empty());
        assert!(resolver.resolve_height(h(5000)).is_genesis());
    }

    #[tokio::test]
    async fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1000 1600000000 {}", "11".repeat(32)).unwrap();
        writeln!(file, "2000 1600075000 {}", "22".repeat(32)).unwrap();

        let resolver = CheckpointResolver::load_or_genesis(file.path()).await;
        assert_eq!(resolver.checkpoints().len(), 2);
        assert_eq!(resolver.resolve_height(h(5000)).height(), h(2000));
    }
}
