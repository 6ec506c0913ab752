use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jclassfile::class_file;
use jclassfile::constant_pool::ConstantPool;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::bytecode::{decode_code, resolve_class_name, resolve_utf8};
use crate::ir::{Class, Method};

/// Classes decoded from the inputs of one run, with counts for reporting.
#[derive(Debug, Default)]
pub(crate) struct ScanOutput {
    pub(crate) classes: Vec<Class>,
    pub(crate) class_count: usize,
    pub(crate) jar_count: usize,
    pub(crate) skipped_classes: usize,
}

impl ScanOutput {
    pub(crate) fn method_count(&self) -> usize {
        self.classes.iter().map(|class| class.methods.len()).sum()
    }
}

/// Decode every class reachable from `inputs`. Explicit inputs must be JAR
/// files, class files or directories; a class that fails to decode is logged
/// and skipped.
pub(crate) fn scan_inputs(inputs: &[PathBuf]) -> Result<ScanOutput> {
    let mut output = ScanOutput::default();

    // Keep deterministic ordering by sorting inputs and directory listings.
    let mut entries = inputs.to_vec();
    entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));
    entries.dedup();

    for entry in entries {
        scan_path(&entry, true, &mut output)?;
    }

    info!(
        classes = output.class_count,
        jars = output.jar_count,
        skipped = output.skipped_classes,
        "scan complete"
    );
    Ok(output)
}

fn scan_path(path: &Path, strict: bool, output: &mut ScanOutput) -> Result<()> {
    if path.is_dir() {
        scan_dir(path, output)?;
        return Ok(());
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "class" => scan_class_file(path, output),
        "jar" => scan_jar_file(path, output),
        _ => {
            if strict {
                anyhow::bail!("unsupported input file: {}", path.display())
            } else {
                Ok(())
            }
        }
    }
}

fn scan_dir(path: &Path, output: &mut ScanOutput) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }

    entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

    for entry in entries {
        if entry.is_dir() {
            scan_dir(&entry, output)?;
        } else {
            scan_path(&entry, false, output)?;
        }
    }

    Ok(())
}

fn scan_class_file(path: &Path, output: &mut ScanOutput) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    push_class(&path_to_uri(path), &data, output);
    Ok(())
}

fn scan_jar_file(path: &Path, output: &mut ScanOutput) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;
    output.jar_count += 1;

    let mut entry_names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.ends_with(".class") && !name.ends_with("module-info.class") {
            entry_names.push(name);
        }
    }

    entry_names.sort();
    debug!(jar = %path.display(), entries = entry_names.len(), "reading jar");

    for name in entry_names {
        let mut entry = archive
            .by_name(&name)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        push_class(&jar_entry_uri(path, &name), &data, output);
    }

    Ok(())
}

/// Decode one class; failures are warnings so the rest of the scan continues.
fn push_class(uri: &str, data: &[u8], output: &mut ScanOutput) {
    match parse_class_bytes(data) {
        Ok(class) => {
            output.class_count += 1;
            output.classes.push(class);
        }
        Err(err) => {
            warn!(class = uri, "skipping class: {err:#}");
            output.skipped_classes += 1;
        }
    }
}

pub(crate) fn parse_class_bytes(data: &[u8]) -> Result<Class> {
    let class_file = class_file::parse(data).context("failed to parse class file bytes")?;
    let constant_pool = class_file.constant_pool();
    let name =
        resolve_class_name(constant_pool, class_file.this_class()).context("resolve class name")?;
    let methods = parse_methods(constant_pool, class_file.methods())
        .with_context(|| format!("decode methods of {name}"))?;
    Ok(Class { name, methods })
}

fn parse_methods(
    constant_pool: &[ConstantPool],
    methods: &[jclassfile::methods::MethodInfo],
) -> Result<Vec<Method>> {
    let mut parsed = Vec::new();
    for method in methods {
        let name =
            resolve_utf8(constant_pool, method.name_index()).context("resolve method name")?;
        let descriptor = resolve_utf8(constant_pool, method.descriptor_index())
            .context("resolve method descriptor")?;
        let code = method
            .attributes()
            .iter()
            .find_map(|attribute| match attribute {
                jclassfile::attributes::Attribute::Code { code, .. } => Some(code),
                _ => None,
            });
        // Abstract and native methods have no body to analyze.
        let Some(code) = code else {
            continue;
        };
        let instructions = decode_code(code, constant_pool)
            .with_context(|| format!("decode bytecode of {name}{descriptor}"))?;
        parsed.push(Method {
            name,
            descriptor,
            code_length: code.len() as u32,
            instructions,
        });
    }
    Ok(parsed)
}

fn path_to_uri(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn jar_entry_uri(jar_path: &Path, entry_name: &str) -> String {
    format!("jar:{}!/{}", jar_path.to_string_lossy(), entry_name)
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
