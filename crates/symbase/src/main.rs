use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use symbase_core::config::RegistryConfig;
use symbase_core::resolver::{LabelCursor, LabelHit, LeafCursor, StructCursor};
use symbase_core::set::{DebugInfoSet, RenamingRules};
use symbase_core::source::ObjectDwarfSource;
use symbase_core::types::{Address, TypeKind, TypeNumber};
use symbase_core::SymbaseResult;
use symbase_utils::{debug, init_logging};

/// Inspect debug symbols and types of an executable by label name or address.
#[derive(Parser, Debug)]
#[command(name = "symbase")]
#[command(version)]
#[command(about = "Inspect debug symbols and types of an executable by label name or address", long_about = None)]
struct Cli
{
    /// Executable whose debug infos are loaded
    executable: PathBuf,

    /// Registry configuration (capacities, renaming rules)
    #[arg(long, env = "SYMBASE_CONFIG")]
    config: Option<PathBuf>,

    /// Load address of the image, for executables with relative addresses
    #[arg(long, value_parser = parse_address, default_value = "0")]
    base: Address,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Table sizes, identity and image information
    Summary,
    /// List labels in name order
    Labels
    {
        /// Only labels containing this text (case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Address and type of a label
    Lookup
    {
        label: String,
    },
    /// Which label, member and index an address belongs to
    Explain
    {
        /// Address (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_address)]
        address: Address,
    },
    /// Flatten a label into its scalar leaves
    Leaves
    {
        label: String,
        /// Report pointers as unsigned integers instead of skipping them
        #[arg(long, default_value_t = false)]
        pointers: bool,
    },
    /// Describe a type by number or name
    Type
    {
        /// Type number (hex with 0x prefix, or decimal) or type name
        number_or_name: String,
    },
}

fn parse_u64(text: &str) -> Result<u64, String>
{
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse(),
    };
    parsed.map_err(|err| format!("invalid number {text}: {err}"))
}

fn parse_address(text: &str) -> Result<Address, String>
{
    parse_u64(text).map(Address::new)
}

fn main()
{
    let _logging = match init_logging() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    let cli = Cli::parse();
    if let Err(e) = run_command(&cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load(executable: &Path, config: &RegistryConfig) -> SymbaseResult<DebugInfoSet>
{
    let short_name = executable
        .file_name()
        .map_or_else(String::new, |name| name.to_string_lossy().into_owned());
    let mut set = DebugInfoSet::new(executable).with_renaming(config.rules_for(&short_name));
    set.load(&ObjectDwarfSource::new())?;
    Ok(set)
}

fn run_command(cli: &Cli) -> Result<(), Box<dyn Error>>
{
    let config = match &cli.config {
        Some(path) => RegistryConfig::from_file(path)?,
        None => RegistryConfig::default(),
    };
    debug!(executable = %cli.executable.display(), "loading debug infos");
    let set = load(&cli.executable, &config)?;

    match &cli.command {
        Commands::Summary => print_summary(&set),
        Commands::Labels { filter } => print_labels(&set, cli.base, filter.as_deref()),
        Commands::Lookup { label } => {
            let hit = lookup_label(&set, label, cli.base).ok_or_else(|| not_found(format!("label {label}")))?;
            let text = set
                .type_string(hit.type_number)
                .map_or_else(|| String::from("?"), |description| description.text);
            println!("{}  {}  {text}", hit.address, hit.name);
        }
        Commands::Explain { address } => {
            let explanation = set
                .explain_address(*address, cli.base)
                .ok_or_else(|| not_found(format!("label at {address}")))?;
            println!("{explanation}");
        }
        Commands::Leaves { label, pointers } => {
            let mut cursor = LeafCursor::for_label(label.as_str(), cli.base).pointers_as_integers(*pointers);
            let mut count = 0_usize;
            while let Some(leaf) = set.next_leaf(&mut cursor) {
                println!("{}  {:<6} {}", leaf.address, leaf.value_type.to_string(), leaf.path);
                count += 1;
            }
            if count == 0 {
                return Err(not_found(format!("scalar leaves of {label}")));
            }
        }
        Commands::Type { number_or_name } => {
            let number = parse_u64(number_or_name)
                .ok()
                .and_then(|raw| u32::try_from(raw).ok())
                .map(TypeNumber::from_raw)
                .or_else(|| set.find_type_by_name(number_or_name))
                .ok_or_else(|| not_found(format!("type {number_or_name}")))?;
            print_type(&set, number)?;
        }
    }
    Ok(())
}

/// Label named `label`, preferring the exact spelling over other cases.
fn lookup_label(set: &DebugInfoSet, label: &str, base: Address) -> Option<LabelHit>
{
    let mut hits = set.labels_named(label, base);
    let exact = hits.iter().position(|hit| hit.name == label).unwrap_or(0);
    (exact < hits.len()).then(|| hits.swap_remove(exact))
}

fn not_found(what: String) -> Box<dyn Error>
{
    format!("no {what}").into()
}

fn print_summary(set: &DebugInfoSet)
{
    let counts = set.counts();
    println!("executable:        {}", set.executable().display());
    if let Some(identity) = set.identity() {
        println!("modified:          {}", identity.modified);
        println!("checksum:          {:016x}", identity.checksum);
    }
    let image = set.image();
    println!("image base:        {}", image.image_base);
    println!("signature:         {}", image.signature.as_deref().unwrap_or("-"));
    println!("pointer size:      {}", image.pointer_size);
    println!("addressing:        {}", image.addressing);
    println!("sections:          {}", image.sections.len());
    println!("types:             {} (+{} synthesized)", counts.types, counts.synthesized_types);
    println!("field groups:      {} ({} members)", counts.field_groups, counts.field_members);
    println!("labels:            {} (+{} unplaced)", counts.labels, counts.unplaced_labels);
    println!("symbol bytes:      {}", counts.symbol_bytes);
}

fn print_labels(set: &DebugInfoSet, base: Address, filter: Option<&str>)
{
    let filter = filter.map(str::to_lowercase);
    let mut cursor = LabelCursor::new();
    while let Some(hit) = set.next_sorted_label(&mut cursor, base) {
        if filter
            .as_deref()
            .is_some_and(|wanted| !hit.name.to_lowercase().contains(wanted))
        {
            continue;
        }
        println!("{}  {}", hit.address, hit.name);
    }
}

fn print_type(set: &DebugInfoSet, number: TypeNumber) -> Result<(), Box<dyn Error>>
{
    let description = set
        .type_string(number)
        .ok_or_else(|| not_found(format!("type {number}")))?;
    println!("{number}  {}  {}", description.kind, description.text);
    println!("size: {}", set.type_size(number).unwrap_or(0));

    match description.kind {
        TypeKind::Struct => {
            let mut cursor = StructCursor::new();
            while let Some(entry) = set.next_struct_entry(number, &mut cursor) {
                let member_type = set
                    .type_string(entry.type_number)
                    .map_or_else(|| String::from("?"), |member| member.text);
                println!("  +{:<6} {}: {member_type}", entry.offset, entry.name);
            }
        }
        TypeKind::Array => {
            if let Some(layout) = set.array_layout(number) {
                println!(
                    "  {} x {} ({} bytes each)",
                    layout.element_count, layout.element, layout.element_size
                );
            }
        }
        TypeKind::Pointer => {
            if let Some(target) = set.points_to(number) {
                println!("  -> {} ({})", target.declared, target.resolved.kind);
            }
        }
        _ => {}
    }
    Ok(())
}
