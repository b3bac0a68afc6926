//! Inspect a PDF at the object level.
//!
//! Prints the version, trailer, security state and object count. Optionally
//! dumps one object, decodes one stream to stdout, or rewrites the file.
//!
//! Usage:
//!   cargo run --release --bin pdf_inspect -- file.pdf
//!   cargo run --release --bin pdf_inspect -- file.pdf --password secret --object 12
//!   cargo run --release --bin pdf_inspect -- file.pdf --decode 7 > content.bin
//!   cargo run --release --bin pdf_inspect -- file.pdf --rewrite repaired.pdf

use pdf_oxide_core::config::{OpenOptions, PasswordPolicy};
use pdf_oxide_core::document::Document;
use pdf_oxide_core::error::Result;
use pdf_oxide_core::object::{Object, ObjectRef};
use pdf_oxide_core::writer::{save_to_path, ObjectSerializer, SaveOptions};
use std::io::Write;
use std::path::PathBuf;

struct InspectConfig {
    input: PathBuf,
    password: Option<String>,
    object: Option<u32>,
    decode: Option<u32>,
    rewrite: Option<PathBuf>,
}

impl InspectConfig {
    fn from_args() -> Option<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut input = None;
        let mut password = None;
        let mut object = None;
        let mut decode = None;
        let mut rewrite = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--password" => {
                    i += 1;
                    password = args.get(i).cloned();
                },
                "--object" => {
                    i += 1;
                    object = args.get(i).and_then(|s| s.parse().ok());
                },
                "--decode" => {
                    i += 1;
                    decode = args.get(i).and_then(|s| s.parse().ok());
                },
                "--rewrite" => {
                    i += 1;
                    rewrite = args.get(i).map(PathBuf::from);
                },
                other if input.is_none() && !other.starts_with("--") => {
                    input = Some(PathBuf::from(other));
                },
                other => {
                    eprintln!("Ignoring unknown argument: {}", other);
                },
            }
            i += 1;
        }

        Some(Self {
            input: input?,
            password,
            object,
            decode,
            rewrite,
        })
    }
}

/// Newest generation of `number`, or 0 when it is not listed.
fn reference_for(doc: &Document, number: u32) -> ObjectRef {
    doc.references()
        .into_iter()
        .find(|r| r.id == number)
        .unwrap_or(ObjectRef::new(number, 0))
}

fn print_summary(doc: &Document) -> Result<()> {
    let serializer = ObjectSerializer::new();
    let (major, minor) = doc.version();
    println!("Version:    {}.{}", major, minor);
    println!("Objects:    {}", doc.object_numbers().len());
    println!("Repaired:   {}", doc.was_repaired());
    match doc.security_context() {
        Some(ctx) => {
            println!("Encrypted:  V{} R{} ({}-bit)", ctx.version, ctx.revision, ctx.key_length * 8);
            println!("Password:   {:?}", ctx.validity);
            println!("Strings:    {:?}", ctx.string_method);
            println!("Streams:    {:?}", ctx.stream_method);
            println!("Permissions: {:?}", ctx.permissions);
        },
        None => println!("Encrypted:  no"),
    }
    let trailer = serializer.serialize(&Object::Dictionary(doc.trailer().clone()))?;
    println!("Trailer:\n{}", String::from_utf8_lossy(&trailer));
    Ok(())
}

fn run(config: &InspectConfig) -> Result<()> {
    let mut options = OpenOptions::default().with_password_policy(PasswordPolicy::Locked);
    if let Some(password) = &config.password {
        options = options.with_password(password.as_bytes());
    }
    let doc = Document::open_path(&config.input, options)?;

    if let Some(number) = config.decode {
        let stream = doc.resolve(reference_for(&doc, number))?;
        let decoded = doc.decode_stream(&stream)?;
        if decoded.partial {
            log::warn!("Stream {} decoded only partially", number);
        }
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&decoded.data)?;
        stdout.flush()?;
        return Ok(());
    }

    print_summary(&doc)?;

    if let Some(number) = config.object {
        let reference = reference_for(&doc, number);
        let object = doc.resolve(reference)?;
        // Stream payloads are replaced by their length
        let shown = match &object {
            Object::Stream { dict, data } => {
                let mut dict = dict.clone();
                dict.insert("Length".into(), Object::Integer(data.len() as i64));
                Object::Dictionary(dict)
            },
            other => other.clone(),
        };
        let text = ObjectSerializer::new().serialize(&shown)?;
        println!("{}:\n{}", reference, String::from_utf8_lossy(&text));
    }

    if let Some(output) = &config.rewrite {
        save_to_path(&doc, output, &SaveOptions::full())?;
        println!("Rewrote to {}", output.display());
    }

    Ok(())
}

fn main() {
    env_logger::init();

    let Some(config) = InspectConfig::from_args() else {
        eprintln!("Usage: pdf_inspect <file> [--password P] [--object N] [--decode N] [--rewrite OUT]");
        std::process::exit(2);
    };

    if let Err(e) = run(&config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
