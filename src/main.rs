use std::env;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use log::info;

use rusty_fat32::fs::entry::FileEntry;
use rusty_fat32::fs::fat32::{join_path, Node};
use rusty_fat32::fs::{open_image, OpenOptions};
use rusty_fat32::logging;
use rusty_fat32::partition::format_size;
use rusty_fat32::Fat32Error;

const USAGE: &str = "\
usage: rusty-fat32 [-v|-vv] [--offset BYTES | --partition N] <command> <image> [args]

commands:
  info <image>                     show volume geometry
  ls [--json] <image> [path]       list a directory
  tree <image> [path]              list a directory recursively
  cat <image> <path>               write a file to stdout
  extract <image> <path> <dest>    copy a file or directory tree out of the image";

#[derive(Debug)]
enum Command {
    Info,
    Ls { path: String, json: bool },
    Tree { path: String },
    Cat { path: String },
    Extract { path: String, dest: PathBuf },
}

#[derive(Debug)]
struct Args {
    verbosity: u8,
    options: OpenOptions,
    image: PathBuf,
    command: Command,
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let mut verbosity = 0u8;
    let mut options = OpenOptions::default();
    let mut json = false;
    let mut positional = Vec::new();

    let mut iter = raw.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-v" => verbosity += 1,
            "-vv" => verbosity += 2,
            "--json" => json = true,
            "--offset" => {
                let value = iter.next().context("--offset needs a byte count")?;
                options.partition_offset = value
                    .parse()
                    .with_context(|| format!("invalid --offset value: {value}"))?;
            }
            "--partition" => {
                let value = iter.next().context("--partition needs a number")?;
                let index = value
                    .parse()
                    .with_context(|| format!("invalid --partition value: {value}"))?;
                options.partition = Some(index);
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                process::exit(0);
            }
            other if other.starts_with('-') && other.len() > 1 => {
                bail!("unknown option: {other}")
            }
            _ => positional.push(arg.clone()),
        }
    }

    let mut positional = positional.into_iter();
    let name = positional.next().context("missing command")?;
    let image = PathBuf::from(positional.next().context("missing image path")?);
    let path_or_root = |p: Option<String>| p.unwrap_or_else(|| "/".to_string());

    let command = match name.as_str() {
        "info" => Command::Info,
        "ls" => Command::Ls {
            path: path_or_root(positional.next()),
            json,
        },
        "tree" => Command::Tree {
            path: path_or_root(positional.next()),
        },
        "cat" => Command::Cat {
            path: positional.next().context("cat needs a path")?,
        },
        "extract" => Command::Extract {
            path: positional.next().context("extract needs a path")?,
            dest: PathBuf::from(positional.next().context("extract needs a destination")?),
        },
        other => bail!("unknown command: {other}"),
    };
    if let Some(extra) = positional.next() {
        bail!("unexpected argument: {extra}");
    }

    Ok(Args {
        verbosity,
        options,
        image,
        command,
    })
}

fn main() {
    let raw: Vec<String> = env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}\n\n{USAGE}");
            process::exit(2);
        }
    };

    let env_level = env::var(logging::LOG_ENV).ok();
    let level = logging::level_from(args.verbosity, env_level.as_deref());
    if let Err(e) = logging::init(level) {
        eprintln!("warning: could not install logger: {e}");
    }

    if let Err(e) = run(&args) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let volume = open_image(&args.image, &args.options)
        .with_context(|| format!("failed to open FAT32 volume in {}", args.image.display()))?;

    match &args.command {
        Command::Info => {
            let boot = volume.boot_sector();
            println!("Label:               {}", volume.label().unwrap_or("(none)"));
            println!("Serial:              {:08X}", boot.volume_serial);
            println!("Partition offset:    {}", volume.partition_offset());
            println!(
                "Size:                {} ({} bytes)",
                format_size(volume.total_size()),
                volume.total_size()
            );
            println!("Bytes per sector:    {}", boot.bytes_per_sector);
            println!("Sectors per cluster: {}", boot.sectors_per_cluster);
            println!("Reserved sectors:    {}", boot.reserved_sectors);
            println!("FATs:                {} x {} sectors", boot.fat_count, boot.sectors_per_fat);
            println!("Clusters:            {}", boot.cluster_count());
            println!("Root cluster:        {}", boot.root_cluster);
        }
        Command::Ls { path, json } => {
            let dir = volume
                .resolve(path)
                .with_context(|| format!("cannot resolve {path}"))?;
            let mut entries = Vec::new();
            for child in dir.children().with_context(|| format!("cannot list {path}"))? {
                let child_path = join_path(path, child.name());
                entries.push(child.to_entry(&child_path)?);
            }
            if *json {
                let stdout = io::stdout();
                serde_json::to_writer_pretty(stdout.lock(), &entries)?;
                println!();
            } else {
                for entry in &entries {
                    print_entry(entry);
                }
            }
        }
        Command::Tree { path } => {
            let dir = volume
                .resolve(path)
                .with_context(|| format!("cannot resolve {path}"))?;
            println!("{}", dir.name());
            dir.walk(path, &mut |node, _, depth| {
                println!("{}{}", "  ".repeat(depth), display_name(node)?);
                Ok(())
            })?;
        }
        Command::Cat { path } => {
            let node = volume
                .resolve(path)
                .with_context(|| format!("cannot resolve {path}"))?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            node.write_content_to(&mut out)
                .with_context(|| format!("cannot read {path}"))?;
            out.flush()?;
        }
        Command::Extract { path, dest } => {
            let node = volume
                .resolve(path)
                .with_context(|| format!("cannot resolve {path}"))?;
            let (files, bytes) = extract(&node, dest)?;
            info!("extracted {files} files, {bytes} bytes to {}", dest.display());
            println!("Extracted {files} file(s), {}", format_size(bytes));
        }
    }
    Ok(())
}

fn print_entry(entry: &FileEntry) {
    let size = if entry.is_directory() {
        "<DIR>".to_string()
    } else {
        entry.size_string()
    };
    println!(
        "{} {:>12} {:>19} {}",
        entry.attribute_string(),
        size,
        entry.modified.as_deref().unwrap_or(""),
        entry.name
    );
}

fn display_name<R: io::Read + io::Seek>(node: &Node<'_, R>) -> rusty_fat32::Result<String> {
    Ok(if node.is_directory()? {
        format!("{}/", node.name())
    } else {
        node.name().to_string()
    })
}

/// Copy a file, or a directory tree, to `dest`. Returns files and bytes written.
fn extract<R: io::Read + io::Seek>(node: &Node<'_, R>, dest: &Path) -> Result<(u64, u64)> {
    if !node.is_directory()? {
        let bytes = extract_file(node, dest)?;
        return Ok((1, bytes));
    }

    fs::create_dir_all(dest).with_context(|| format!("cannot create {}", dest.display()))?;
    let mut files = 0u64;
    let mut bytes = 0u64;
    node.walk("", &mut |child, relative, _| {
        let target = contained_path(dest, relative)
            .ok_or_else(|| Fat32Error::UnsupportedComponent(relative.to_string()))?;
        if child.is_directory()? {
            fs::create_dir_all(&target)?;
        } else {
            let mut writer = BufWriter::new(File::create(&target)?);
            bytes += child.write_content_to(&mut writer)?;
            writer.flush()?;
            files += 1;
        }
        Ok(())
    })?;
    Ok((files, bytes))
}

/// `dest` joined with an image-relative path, or `None` when the path is
/// absolute or steps outside `dest`.
fn contained_path(dest: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    let mut components = relative.components().peekable();
    components.peek()?;
    if components.all(|c| matches!(c, Component::Normal(_))) {
        Some(dest.join(relative))
    } else {
        None
    }
}

fn extract_file<R: io::Read + io::Seek>(node: &Node<'_, R>, dest: &Path) -> Result<u64> {
    let file = File::create(dest).with_context(|| format!("cannot create {}", dest.display()))?;
    let mut writer = BufWriter::new(file);
    let bytes = node
        .write_content_to(&mut writer)
        .with_context(|| format!("cannot read {}", node.name()))?;
    writer.flush()?;
    Ok(bytes)
}
