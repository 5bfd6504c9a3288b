//! Interactive shell over a FAT32 image.
//!
//! Commands: `ls`, `cd <name|/>`, `mkdir <name>`, `touch <name>`, `format`,
//! `help`, `exit`/`e`. One positional argument names an existing image; with
//! no argument, `disk1.img` is created fresh.

mod device;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Parser;
use fat32::{Fat32Context, FileDevice, DEFAULT_DISK_SIZE};

use device::Opened;

#[derive(Parser)]
#[command(name = "fat32-shell", about = "Interactive shell over a FAT32 image")]
struct Args {
    /// Path to the image file. Created fresh (20 MiB) if it doesn't exist.
    #[arg(default_value = "disk1.img")]
    image: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut ctx = match device::open_or_create(&args.image)
        .with_context(|| format!("opening {}", args.image.display()))?
    {
        Opened::Existing(device) => Fat32Context::open(Box::new(device))
            .with_context(|| format!("reading {} as a FAT32 image", args.image.display()))?,
        Opened::Created(device) => Fat32Context::create_now(Box::new(device), DEFAULT_DISK_SIZE)
            .with_context(|| format!("formatting {}", args.image.display()))?,
    };

    run(&mut ctx, &args.image)?;

    ctx.close().context("flushing dirty caches on shutdown")?;
    Ok(())
}

fn run(ctx: &mut Fat32Context, image_path: &PathBuf) -> Result<()> {
    let mut current_path = String::from("/");

    loop {
        print!("{current_path}> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            println!("\nNo command, exiting");
            break;
        }

        let mut words = line.trim().split_whitespace();
        let Some(cmd) = words.next() else { continue };
        let arg = words.next();

        match cmd {
            "exit" | "e" => break,
            "help" => print_help(),
            "format" => {
                let device = FileDevice::create(image_path, DEFAULT_DISK_SIZE)?;
                *ctx = Fat32Context::create_now(Box::new(device), DEFAULT_DISK_SIZE)?;
                current_path = String::from("/");
                println!("formatted {}", image_path.display());
            }
            "ls" => {
                if let Err(e) = list_current(ctx, &current_path) {
                    eprintln!("ls: {e}");
                }
            }
            "cd" => match arg {
                None | Some("/") => current_path = String::from("/"),
                Some(target) => match cd(ctx, &current_path, target) {
                    Ok(new_path) => current_path = new_path,
                    Err(e) => eprintln!("cd: {e}"),
                },
            },
            "mkdir" => match arg {
                None => eprintln!("mkdir: missing directory name"),
                Some(name) => {
                    if let Err(e) = create_entry(ctx, &current_path, name, true) {
                        eprintln!("mkdir: {e}");
                    }
                }
            },
            "touch" => match arg {
                None => eprintln!("touch: missing file name"),
                Some(name) => {
                    if let Err(e) = create_entry(ctx, &current_path, name, false) {
                        eprintln!("touch: {e}");
                    }
                }
            },
            other => {
                eprintln!("Unknown command '{other}'. Enter 'help' to see commands.");
            }
        }
    }

    Ok(())
}

fn print_help() {
    println!(
        "help - show this.\n\
         ls - show files.\n\
         format - format disk to FAT32.\n\
         mkdir <dir name> - create directory.\n\
         cd <dir name|/> - open directory.\n\
         touch <file name> - create file.\n\
         exit | e - quit."
    );
}

fn directory_address(ctx: &mut Fat32Context, path: &str) -> Result<u64> {
    if path == "/" {
        return Ok(ctx.root_address());
    }
    let entry = ctx.resolve(path)?;
    if !entry.short.is_directory() {
        anyhow::bail!("'{path}' is not a directory");
    }
    Ok(ctx.bpb().data_address_of(entry.short.first_cluster()))
}

fn list_current(ctx: &mut Fat32Context, current_path: &str) -> Result<()> {
    let address = directory_address(ctx, current_path)?;
    let entries = ctx.list_directory(address)?;

    println!(
        "{:<11}  |  {:<30}  |  {:>10}  |  {}  |  {}",
        "FILE NAME", "LONG FILE NAME", "SIZE", "ATTRS.", "CREAT. DATE & TIME"
    );
    for entry in &entries {
        let short_name = String::from_utf8_lossy(&entry.short.file_name).to_string();
        let long_name = entry.long_name.clone().unwrap_or_default();
        let size = if entry.short.is_directory() {
            "     <DIR>".to_string()
        } else {
            format!("{:>10}", entry.short.file_size)
        };
        let date = fat32::entry::DosDate::decode(entry.short.creation_date);
        let time = fat32::entry::DosTime::decode(entry.short.creation_time);
        println!(
            "{:<11}  |  {:<30}  |  {}  |  {}  |  {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            short_name,
            long_name,
            size,
            entry.short.attrs_string(),
            date.year,
            date.month,
            date.day,
            time.hour,
            time.minute,
            time.second
        );
    }
    println!("{} item(s)", entries.len());
    Ok(())
}

fn cd(ctx: &mut Fat32Context, current_path: &str, target: &str) -> Result<String> {
    let full_path = join_path(current_path, target);
    directory_address(ctx, &full_path)?;
    Ok(if full_path.ends_with('/') { full_path } else { format!("{full_path}/") })
}

fn create_entry(ctx: &mut Fat32Context, current_path: &str, name: &str, is_dir: bool) -> Result<()> {
    let address = directory_address(ctx, current_path)?;
    fat32::mutate::create_directory_entry(ctx, address, name, is_dir)?;
    Ok(())
}

fn join_path(current_path: &str, target: &str) -> String {
    if target.starts_with('/') {
        target.to_string()
    } else {
        format!("{current_path}{target}")
    }
}
