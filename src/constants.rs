// Soundvault Constants
// Values shared by the schema manager, the stores and the reorder engine.
// The parameter layout mirrors the synthesizer's sound dump; do not reorder.

pub const SCHEMA_VERSION: u32 = 2;

// Paths
pub const SOUNDVAULT_FOLDER: &str = ".soundvault";
pub const DB_FILENAME: &str = "library.db";
pub const BACKUPS_FOLDER: &str = "backups";
pub const CONFIG_FILENAME: &str = "config.json";
pub const DEFAULT_LIBRARY_DIR: &str = ".soundvault-library";
pub const BACKUP_FILE_PREFIX: &str = "library-";

// Slot address space: 8 banks x 128 programs
pub const BANK_COUNT: u16 = 8;
pub const BANK_SIZE: u16 = 128;
pub const SLOT_COUNT: u16 = BANK_COUNT * BANK_SIZE;
pub const BANK_LETTERS: [char; 8] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];

// Sound parameter layout
pub const PARAM_COUNT: usize = 383;
pub const NAME_OFFSET: usize = 363;
pub const NAME_LEN: usize = 16;
pub const CATEGORY_INDEX: usize = 379;
pub const RESERVED_PARAMS: [usize; 4] = [0, 380, 381, 382];
pub const OCTAVE_PARAMS: [usize; 3] = [1, 17, 33];
pub const OCTAVE_MIN: i32 = 16;
pub const OCTAVE_MAX: i32 = 112;
pub const OCTAVE_STEP: i32 = 12;
pub const OCTAVE_DEFAULT: i32 = 64;
pub const NAME_CHAR_MIN: i32 = 32;
pub const NAME_CHAR_MAX: i32 = 127;
pub const PARAM_MAX: i32 = 127;

pub const CATEGORIES: [&str; 13] = [
    "Init", "Arp", "Atmo", "Bass", "Drum", "FX", "Keys",
    "Lead", "Mono", "Pad", "Perc", "Poly", "Seq",
];

// Naming
pub const UNTITLED_NAME: &str = "Init";
pub const NAME_SUFFIX_MAX: u32 = 999;

// Collections
pub const FACTORY_COLLECTION_COUNT: usize = 3;
pub const FACTORY_COLLECTIONS: [&str; 3] = ["Factory 2008", "Factory 2012", "Factory Legacy"];
pub const COLLECTION_NAME_MAX_LEN: usize = 32;
pub const FIXED_REFERENCE_COLUMNS: [&str; 2] = ["uid", "tags"];
pub const RESERVED_COLLECTION_NAMES: [&str; 16] = [
    "uid", "tags", "rowid", "oid", "_rowid_", "select", "insert", "update",
    "delete", "table", "from", "where", "null", "index", "drop", "create",
];

// Batching: the backing store limits bound parameters per statement
pub const DEFAULT_CHUNK_SIZE: usize = 400;
pub const MIN_CHUNK_SIZE: usize = 1;
pub const MAX_CHUNK_SIZE: usize = 500;

// Tags
pub const DEFAULT_TAG_BG_COLOR: i64 = 0x00_5A_5A_5A;
pub const DEFAULT_TAG_FG_COLOR: i64 = 0x00_FF_FF_FF;

// Wavetables
pub const WAVES_PER_TABLE: usize = 64;
pub const SAMPLES_PER_WAVE: usize = 128;
pub const WAVETABLE_SAMPLES: usize = WAVES_PER_TABLE * SAMPLES_PER_WAVE;
pub const USER_WAVETABLE_FIRST_SLOT: i64 = 80;
pub const USER_WAVETABLE_LAST_SLOT: i64 = 118;
pub const WAVE_SAMPLE_MIN: i32 = -(1 << 20);
pub const WAVE_SAMPLE_MAX: i32 = (1 << 20) - 1;
pub const PREVIEW_POINTS: usize = 128;

// Seeding: one bit per factory collection plus the wavetable previews
pub const SEED_PREVIEWS_BIT: u8 = 1 << FACTORY_COLLECTION_COUNT;
pub const SEED_ALL_EMPTY: u8 = (1 << (FACTORY_COLLECTION_COUNT + 1)) - 1;

// Backups
pub const DEFAULT_BACKUP_INTERVAL_SECS: u64 = 900;
pub const DEFAULT_BACKUP_KEEP: usize = 5;
pub const DEFAULT_BACKUP_PAGES_PER_STEP: i32 = 64;
pub const BACKUP_BUSY_RETRY_MS: u64 = 50;
pub const WORKER_POLL_MS: u64 = 250;

// SQLite
pub const BUSY_TIMEOUT_MS: u32 = 5000;
