// Soundvault CLI binary

use std::path::{Path, PathBuf};
use clap::{Parser, Subcommand};
use anyhow::Result;

use soundvault_lib::collections::slots;
use soundvault_lib::constants::{BANK_LETTERS, SLOT_COUNT};
use soundvault_lib::db;
use soundvault_lib::params;
use soundvault_lib::{Library, LibraryConfig, Uid};

#[derive(Parser)]
#[command(name = "soundvault")]
#[command(about = "Soundvault - sound library and collections for a hardware synthesizer", long_about = None)]
#[command(version)]
struct Cli {
    /// Library root (defaults to ~/.soundvault-library)
    #[arg(short, long, global = true)]
    library: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a library, or migrate and repair an existing one
    Init,

    /// Show library summary
    Info,

    /// List collections
    Collections,

    /// Create a user collection
    CreateCollection {
        name: String,
        /// Copy the slot layout of this collection
        #[arg(long)]
        from: Option<String>,
        /// Fill the empty slots of these banks (A-H) with Init sounds
        #[arg(long, value_delimiter = ',')]
        init_banks: Vec<String>,
    },

    /// Rename a user collection
    RenameCollection { old: String, new: String },

    /// Delete a user collection (its sounds stay in the library)
    DeleteCollection { name: String },

    /// List the occupied slots of a collection
    List {
        collection: String,
        /// Only show this bank (A-H)
        #[arg(long)]
        bank: Option<String>,
    },

    /// Show one sound
    Show { uid: String },

    /// Move sounds at SLOTS to TARGETS; displaced sounds take the vacated slots
    Swap {
        collection: String,
        #[arg(long, value_delimiter = ',', required = true)]
        slots: Vec<String>,
        #[arg(long, value_delimiter = ',', required = true)]
        targets: Vec<String>,
    },

    /// Move sounds as one block to an insertion point, shifting the rest
    Move {
        collection: String,
        #[arg(long, value_delimiter = ',', required = true)]
        slots: Vec<String>,
        /// Insertion point: a slot label, a number, or "end"
        #[arg(long)]
        to: String,
    },

    /// Count sounds per tag
    Tags {
        #[arg(long)]
        collection: Option<String>,
    },

    /// Write a backup of the library now
    Backup,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let root = resolve_library_root(cli.library)?;

    match cli.command {
        Commands::Init => cmd_init(root),
        Commands::Info => cmd_info(root),
        Commands::Collections => cmd_collections(root),
        Commands::CreateCollection { name, from, init_banks } => cmd_create_collection(root, name, from, init_banks),
        Commands::RenameCollection { old, new } => {
            open(&root)?.rename_collection(&old, &new)?;
            println!("Renamed '{}' to '{}'", old, new);
            Ok(())
        }
        Commands::DeleteCollection { name } => {
            open(&root)?.delete_collection(&name)?;
            println!("Deleted collection '{}'", name);
            Ok(())
        }
        Commands::List { collection, bank } => cmd_list(root, collection, bank),
        Commands::Show { uid } => cmd_show(root, uid),
        Commands::Swap { collection, slots, targets } => cmd_swap(root, collection, slots, targets),
        Commands::Move { collection, slots, to } => cmd_move(root, collection, slots, to),
        Commands::Tags { collection } => cmd_tags(root, collection),
        Commands::Backup => cmd_backup(root),
    }
}

fn cmd_init(root: PathBuf) -> Result<()> {
    std::fs::create_dir_all(db::get_soundvault_path(&root))?;
    let config_path = db::get_config_path(&root);
    if !config_path.exists() {
        LibraryConfig::default().save(&config_path)?;
    }

    let lib = open(&root)?;
    let report = lib.report();

    println!("Library at {}", root.display());
    if report.created {
        println!("  Created new library");
    }
    if report.migrated_legacy {
        println!("  Migrated legacy reference table");
    }
    for repair in &report.repairs {
        println!(
            "  Repaired '{}': {} trimmed, {} purged, {} duplicates, {} out of range, {} orphans",
            repair.collection,
            repair.trimmed,
            repair.purged,
            repair.duplicates_nulled,
            repair.out_of_range,
            repair.orphans_removed
        );
    }
    println!("  Seed state:   {:?}", report.seed_state);
    println!("  Row changes:  {}", report.changes);
    Ok(())
}

fn cmd_info(root: PathBuf) -> Result<()> {
    let info = open(&root)?.info()?;

    println!("Library:     {}", info.path.display());
    println!("Sounds:      {}", info.sounds);
    println!("Tags:        {}", info.tags);
    println!("Templates:   {}", info.templates);
    println!("Collections: {}", info.collections.len());
    Ok(())
}

fn cmd_collections(root: PathBuf) -> Result<()> {
    let info = open(&root)?.info()?;

    println!("{:<32}  {:>8}  {}", "Name", "Sounds", "Kind");
    println!("{}", "-".repeat(52));
    for c in info.collections {
        let kind = if c.is_factory { "factory" } else { "user" };
        println!("{:<32}  {:>8}  {}", c.name, c.members, kind);
    }
    Ok(())
}

fn cmd_create_collection(root: PathBuf, name: String, from: Option<String>, init_banks: Vec<String>) -> Result<()> {
    let banks = init_banks
        .iter()
        .map(|b| parse_bank(b))
        .collect::<Result<Vec<u16>>>()?;

    let mut lib = open(&root)?;
    let handle = lib.create_collection(&name, from.as_deref(), &banks)?;
    let members = lib.list_slots(&handle.name)?.len();
    println!("Created collection '{}' with {} sounds", handle.name, members);
    Ok(())
}

fn cmd_list(root: PathBuf, collection: String, bank: Option<String>) -> Result<()> {
    let lib = open(&root)?;
    let bank = bank.as_deref().map(parse_bank).transpose()?;
    let members = lib.collection_members(&collection)?;

    let uids: Vec<Uid> = members
        .iter()
        .filter(|(slot, _)| bank.map_or(true, |b| slots::bank_of(**slot) == b))
        .map(|(_, uid)| uid.clone())
        .collect();
    if uids.is_empty() {
        println!("No sounds in '{}'", collection);
        return Ok(());
    }

    let sounds = lib.get_sounds(&uids)?;
    println!("{:>5}  {:<16}  {:<6}  {}", "Slot", "Name", "Cat", "UID");
    println!("{}", "-".repeat(70));
    for (slot, uid) in members.iter().filter(|(_, u)| uids.contains(u)) {
        if let Some(sound) = sounds.iter().find(|s| &s.uid == uid) {
            println!(
                "{:>5}  {:<16}  {:<6}  {}",
                slots::slot_label(*slot),
                sound.name,
                params::category_name(i64::from(sound.category)),
                uid
            );
        }
    }
    Ok(())
}

fn cmd_show(root: PathBuf, uid: String) -> Result<()> {
    let lib = open(&root)?;
    let uid = Uid::from(uid);
    let sound = lib.get_sound(&uid)?;
    let tags = lib.get_tags(std::slice::from_ref(&uid))?;

    println!("Sound {}", sound.uid);
    println!();
    println!("Name:        {}", sound.name);
    println!("Category:    {}", params::category_name(i64::from(sound.category)));
    if let Some(tags) = tags.get(&uid).filter(|t| !t.is_empty()) {
        println!("Tags:        {}", tags.join(", "));
    }
    if lib.is_factory_locked(&uid)? {
        println!("Factory:     yes (read-only)");
    }

    let placements = lib.collections_of(&uid)?;
    if !placements.is_empty() {
        println!();
        println!("Collections:");
        for (name, slot) in placements {
            println!("  {:<32} {}", name, slots::slot_label(slot));
        }
    }
    Ok(())
}

fn cmd_swap(root: PathBuf, collection: String, sources: Vec<String>, targets: Vec<String>) -> Result<()> {
    let lib = open(&root)?;
    let mut uids = Vec::with_capacity(sources.len());
    for label in &sources {
        let slot = slots::parse_slot(label)?;
        let uid = lib
            .get_uid_at(&collection, i64::from(slot))?
            .ok_or_else(|| anyhow::anyhow!("Slot {} of '{}' is empty", label, collection))?;
        uids.push(uid);
    }
    let targets = targets
        .iter()
        .map(|t| slots::parse_slot(t).map_err(anyhow::Error::from))
        .collect::<Result<Vec<u16>>>()?;

    lib.swap_slots(&collection, &uids, &targets)?;
    println!("Moved {} sounds in '{}'", uids.len(), collection);
    Ok(())
}

fn cmd_move(root: PathBuf, collection: String, sources: Vec<String>, to: String) -> Result<()> {
    let lib = open(&root)?;
    let sources = sources
        .iter()
        .map(|s| slots::parse_slot(s).map_err(anyhow::Error::from))
        .collect::<Result<Vec<u16>>>()?;
    let target = if to.eq_ignore_ascii_case("end") {
        SLOT_COUNT
    } else {
        slots::parse_slot(&to)?
    };

    if lib.insert_with_shift(&collection, &sources, target)? {
        println!("Moved {} sounds in '{}'", sources.len(), collection);
    } else {
        println!("Nothing to move");
    }
    Ok(())
}

fn cmd_tags(root: PathBuf, collection: Option<String>) -> Result<()> {
    let counts = open(&root)?.count_by_tag(collection.as_deref())?;
    if counts.is_empty() {
        println!("No tagged sounds.");
        return Ok(());
    }

    println!("{:<24}  {:>8}", "Tag", "Sounds");
    println!("{}", "-".repeat(34));
    for (tag, count) in counts {
        println!("{:<24}  {:>8}", tag, count);
    }
    Ok(())
}

fn cmd_backup(root: PathBuf) -> Result<()> {
    let outcome = open(&root)?.backup_now()?;

    println!("Backup written to {}", outcome.path.display());
    println!("  Pages:  {}", outcome.pages);
    println!("  Hash:   {}", outcome.hash);
    if !outcome.pruned.is_empty() {
        println!("  Pruned {} old backups", outcome.pruned.len());
    }
    Ok(())
}

// --- Helper Functions ---

fn resolve_library_root(library: Option<PathBuf>) -> Result<PathBuf> {
    let path = match library {
        Some(p) => p,
        None => db::default_library_root()
            .ok_or_else(|| anyhow::anyhow!("No home directory; pass --library"))?,
    };
    Ok(path.canonicalize().unwrap_or(path))
}

fn open(root: &Path) -> Result<Library> {
    Ok(Library::open_root(root)?)
}

fn parse_bank(input: &str) -> Result<u16> {
    let letter = input.trim().chars().next().map(|c| c.to_ascii_uppercase());
    BANK_LETTERS
        .iter()
        .position(|b| Some(*b) == letter)
        .map(|i| i as u16)
        .ok_or_else(|| anyhow::anyhow!("Not a bank: '{}' (expected A-H)", input))
}
