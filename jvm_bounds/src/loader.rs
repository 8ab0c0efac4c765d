//! Class repository: where the analysis looks classes up by name.
//!
//! Inputs are loaded eagerly, before any analysis starts, so a decode
//! failure in any input aborts the run without partial results. Accepted
//! inputs:
//!
//! - `.class` files, decoded and lowered to IR
//! - `.jar` (or `.zip`) archives, every `.class` entry in archive order
//! - `.json` files holding an array of serialized [`ClassIr`]s
//! - directories, walked recursively in sorted order for `.class` and `.json`

use crate::error::{LoadError, LoweringError};
use crate::ir::ClassIr;
use crate::lowering::lower_class;
use jvm_bounds_classfile::ClassFile;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Name-based class lookup used during analysis.
pub trait ClassRepository {
    /// The class with internal name `name`, e.g. `java/util/List`.
    fn lookup(&self, name: &str) -> Option<&ClassIr>;
}

/// In-memory repository of lowered classes, keyed by internal name.
#[derive(Debug, Clone, Default)]
pub struct Repository {
    classes: BTreeMap<String, ClassIr>,
}

impl ClassRepository for Repository {
    fn lookup(&self, name: &str) -> Option<&ClassIr> {
        self.classes.get(name)
    }
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `class`, replacing any earlier class with the same name.
    pub fn add_class(&mut self, class: ClassIr) {
        if self.classes.contains_key(&class.name) {
            warn!("class {} loaded twice; keeping the last definition", class.name);
        }
        self.classes.insert(class.name.clone(), class);
    }

    /// Loads a `.class` file, a `.jar` archive, a `.json` IR file or a
    /// directory of class and IR files.
    /// Returns the names of the classes added, in load order.
    pub fn load_path(&mut self, path: &Path) -> Result<Vec<String>, LoadError> {
        let metadata = fs::metadata(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if metadata.is_dir() {
            return self.load_dir(path);
        }
        let names = match extension(path).as_deref() {
            Some("class") => {
                let bytes = read(path)?;
                vec![self.load_class_bytes(&bytes).map_err(|e| e.with_path(path))?]
            }
            Some("json") => {
                let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                self.load_json_str(&text).map_err(|e| e.with_path(path))?
            }
            Some("jar") | Some("zip") => self.load_archive(path)?,
            _ => {
                return Err(LoadError::UnsupportedInput {
                    path: path.to_path_buf(),
                })
            }
        };
        debug!("loaded {} from {}", names.join(", "), path.display());
        Ok(names)
    }

    fn load_dir(&mut self, dir: &Path) -> Result<Vec<String>, LoadError> {
        let io_error = |source| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(io_error)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<_, _>>()
            .map_err(io_error)?;
        entries.sort();

        let mut names = Vec::new();
        for entry in entries {
            if entry.is_dir() {
                names.extend(self.load_dir(&entry)?);
            } else if matches!(extension(&entry).as_deref(), Some("class" | "json")) {
                names.extend(self.load_path(&entry)?);
            }
        }
        Ok(names)
    }

    fn load_archive(&mut self, path: &Path) -> Result<Vec<String>, LoadError> {
        let archive_error = |source| LoadError::Archive {
            path: path.to_path_buf(),
            source,
        };
        let file = fs::File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut archive = zip::ZipArchive::new(file).map_err(archive_error)?;

        let mut names = Vec::new();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(archive_error)?;
            if entry.is_dir() || !entry.name().ends_with(".class") {
                continue;
            }
            let entry_path = path.join(entry.name());
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes).map_err(|source| LoadError::Io {
                path: entry_path.clone(),
                source,
            })?;
            names.push(self.load_class_bytes(&bytes).map_err(|e| e.with_path(&entry_path))?);
        }
        Ok(names)
    }

    /// Decodes and lowers one class file image.
    pub fn load_class_bytes(&mut self, bytes: &[u8]) -> Result<String, LoadError> {
        let class_file = ClassFile::parse(bytes).map_err(|source| LoadError::ClassFile {
            path: PathBuf::new(),
            source,
        })?;
        let class = lower_class(&class_file).map_err(|source| LoadError::Lowering {
            class: class_file.this_class.clone(),
            source,
        })?;
        let name = class.name.clone();
        self.add_class(class);
        Ok(name)
    }

    /// Parses a JSON array of [`ClassIr`] and checks their branch targets.
    /// Nothing is added unless every class is valid.
    pub fn load_json_str(&mut self, text: &str) -> Result<Vec<String>, LoadError> {
        let mut classes: Vec<ClassIr> = serde_json::from_str(text).map_err(|source| LoadError::Json {
            path: PathBuf::new(),
            source,
        })?;
        for class in &mut classes {
            validate_targets(class)?;
            for method in &mut class.methods {
                method.lines.sort();
            }
        }
        let names = classes.iter().map(|c| c.name.clone()).collect();
        for class in classes {
            self.add_class(class);
        }
        Ok(names)
    }

    /// Loaded class names in sorted order.
    pub fn class_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.classes.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl LoadError {
    /// Fills in the input path of errors raised while decoding in memory.
    fn with_path(self, path: &Path) -> Self {
        match self {
            LoadError::ClassFile { source, .. } => LoadError::ClassFile {
                path: path.to_path_buf(),
                source,
            },
            LoadError::Json { source, .. } => LoadError::Json {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn read(path: &Path) -> Result<Vec<u8>, LoadError> {
    fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn validate_targets(class: &ClassIr) -> Result<(), LoadError> {
    for method in &class.methods {
        let len = method.instructions.len();
        for (offset, instruction) in method.instructions.iter().enumerate() {
            if let Some(&target) = instruction.targets().iter().find(|&&t| t >= len) {
                return Err(LoadError::Lowering {
                    class: class.name.clone(),
                    source: LoweringError::InvalidBranchTarget {
                        offset,
                        target: target as i64,
                    },
                });
            }
        }
    }
    Ok(())
}
