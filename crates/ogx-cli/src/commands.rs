use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use ogx_sdk::{FsUnitStore, ObjectKey, ObjectRef, Scalar, Serializer, SerializerConfig, UnitInfo};
use serde_json::{json, Value};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut serializer = open_serializer(&cli)?;
    let validate = serializer.config().validate;
    match &cli.command {
        Command::Inspect(args) => cmd_inspect(&mut serializer, args, validate, &cli.format),
        Command::Units(args) => cmd_units(&mut serializer, args, &cli.format),
        Command::Resave(args) => cmd_resave(&mut serializer, args, validate, &cli.format),
    }
}

fn open_serializer(cli: &Cli) -> anyhow::Result<Serializer> {
    let mut config = match &cli.config {
        Some(path) => SerializerConfig::load(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => SerializerConfig::default(),
    };
    config.record_types.extend(cli.record_types.iter().cloned());
    config.validate |= cli.validate;
    Ok(Serializer::with_config(Arc::new(FsUnitStore::cwd()), config)?)
}

fn cmd_inspect(
    serializer: &mut Serializer,
    args: &InspectArgs,
    validate: bool,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let root = serializer
        .load(&args.file, validate)
        .with_context(|| format!("cannot load {}", args.file.display()))?;
    match format {
        OutputFormat::Text => print!("{}", render_tree(&root, args.depth)),
        OutputFormat::Json => {
            let tree = tree_json(&root, &mut HashSet::new());
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
    }
    Ok(())
}

fn cmd_units(serializer: &mut Serializer, args: &UnitsArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let units = serializer
        .units(&args.file)
        .with_context(|| format!("cannot read {}", args.file.display()))?;
    match format {
        OutputFormat::Text => {
            for unit in &units {
                println!(
                    "{}  {}  v{}  {} object(s)",
                    unit.path.display().to_string().bold(),
                    unit.root.cyan(),
                    unit.version,
                    unit.objects
                );
                for include in &unit.includes {
                    println!("  {} {}", "->".dimmed(), include.display());
                }
            }
            println!("{} unit(s)", units.len());
        }
        OutputFormat::Json => {
            let listed: Vec<Value> = units.iter().map(unit_json).collect();
            println!("{}", serde_json::to_string_pretty(&listed)?);
        }
    }
    Ok(())
}

fn cmd_resave(
    serializer: &mut Serializer,
    args: &ResaveArgs,
    validate: bool,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let root = serializer
        .load(&args.file, validate)
        .with_context(|| format!("cannot load {}", args.file.display()))?;
    let write_schema = args.schema || serializer.config().write_schema;
    let report = serializer
        .save(&root, &args.out, write_schema)
        .with_context(|| format!("cannot save into {}", args.out.display()))?;
    match format {
        OutputFormat::Text => {
            for unit in &report.units {
                println!(
                    "{} {}  {}  {}",
                    "✓".green(),
                    unit.file.display().to_string().bold(),
                    unit.root.cyan(),
                    unit.digest[..12].dimmed()
                );
            }
            for file in report.buffers.iter().chain(&report.schemas) {
                println!("{} {}", "✓".green(), file.display());
            }
            println!(
                "Saved {} at version {}.",
                root.label().yellow(),
                serializer.current_version()
            );
        }
        OutputFormat::Json => {
            let saved = json!({
                "root": root.label(),
                "version": serializer.current_version().0,
                "units": report.units.iter().map(|u| json!({
                    "file": u.file.display().to_string(),
                    "root": u.root,
                    "objects": u.objects,
                    "digest": u.digest,
                })).collect::<Vec<_>>(),
                "buffers": report.buffers.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
                "schemas": report.schemas.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&saved)?);
        }
    }
    Ok(())
}

/// Indented object tree. Objects met a second time are printed once more
/// as a marker, without their content.
fn render_tree(root: &ObjectRef, max_depth: Option<usize>) -> String {
    let mut out = String::new();
    let mut seen = HashSet::new();
    render_object(&mut out, root, None, 0, max_depth, &mut seen);
    out
}

fn render_object(
    out: &mut String,
    object: &ObjectRef,
    slot: Option<&str>,
    depth: usize,
    max_depth: Option<usize>,
    seen: &mut HashSet<ObjectKey>,
) {
    let indent = "  ".repeat(depth);
    let name = slot.map(|s| format!("{s}: ")).unwrap_or_default();
    let label = object.label();
    if !seen.insert(ObjectKey::of(object)) {
        let _ = writeln!(out, "{indent}{name}{} {}", label.cyan(), "(shared)".dimmed());
        return;
    }
    match object.value() {
        Some(value) => {
            let _ = writeln!(out, "{indent}{name}{} = {value}", label.cyan());
        }
        None => {
            let _ = writeln!(out, "{indent}{name}{}", label.cyan().bold());
        }
    }
    for (field, value) in object.fields() {
        let _ = writeln!(out, "{indent}  .{field} = {value}");
    }
    if let Some(buffer) = object.buffer() {
        let _ = writeln!(out, "{indent}  [buffer, {} bytes]", buffer.len());
    }
    if max_depth.is_some_and(|max| depth >= max) {
        let children = object.slots().len();
        if children > 0 {
            let _ = writeln!(out, "{indent}  {}", format!("... {children} child(ren)").dimmed());
        }
        return;
    }
    for child in object.slots() {
        render_object(out, &child.object, child.name.as_deref(), depth + 1, max_depth, seen);
    }
}

fn scalar_json(value: &Scalar) -> Value {
    match value {
        Scalar::Bool(v) => json!(v),
        Scalar::Int(v) => json!(v),
        Scalar::Float(v) => json!(v),
        Scalar::Text(v) => json!(v),
    }
}

fn tree_json(object: &ObjectRef, seen: &mut HashSet<ObjectKey>) -> Value {
    let id = object.id().map(|id| id.to_string());
    if !seen.insert(ObjectKey::of(object)) {
        return json!({ "type": object.type_tag().as_str(), "ref": id });
    }
    let fields: serde_json::Map<String, Value> = object
        .fields()
        .iter()
        .map(|(name, value)| (name.clone(), scalar_json(value)))
        .collect();
    let children: Vec<Value> = object
        .slots()
        .iter()
        .map(|slot| json!({ "name": slot.name, "object": tree_json(&slot.object, seen) }))
        .collect();
    json!({
        "type": object.type_tag().as_str(),
        "id": id,
        "value": object.value().as_ref().map(scalar_json),
        "fields": fields,
        "buffer_bytes": object.buffer().map(|b| b.len()),
        "children": children,
    })
}

fn unit_json(unit: &UnitInfo) -> Value {
    json!({
        "path": unit.path.display().to_string(),
        "version": unit.version.0,
        "root": unit.root,
        "objects": unit.objects,
        "includes": unit.includes.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
    })
}
