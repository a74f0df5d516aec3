//! Fixture archives shared by the scenario tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Entry names of the nesting archives, each holding `nested.jar`.
pub const NESTING: [&str; 4] = [
    "nesting-nested.jar",
    "nesting nested.jar",
    "nesting$nested.jar",
    "nesting+nested.jar",
];

/// Name of the nested archive that holds only `other.dat`.
pub const OTHER: &str = "n123456789012345678901234567890.jar";

enum Item {
    File(&'static str, Vec<u8>, CompressionMethod),
    Dir(&'static str),
}

fn stored(name: &'static str, data: Vec<u8>) -> Item {
    Item::File(name, data, CompressionMethod::Stored)
}

fn jar(items: Vec<Item>) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for item in items {
        match item {
            Item::File(name, data, method) => {
                let options = SimpleFileOptions::default().compression_method(method);
                writer.start_file(name, options).unwrap();
                writer.write_all(&data).unwrap();
            }
            Item::Dir(name) => {
                writer.add_directory(name, SimpleFileOptions::default()).unwrap();
            }
        }
    }
    writer.finish().unwrap().into_inner()
}

/// `3.dat` = [3] and `4.dat` = [4].
pub fn nested_jar() -> Vec<u8> {
    jar(vec![stored("3.dat", vec![3]), stored("4.dat", vec![4])])
}

fn nesting_jar(inner_name: &'static str) -> Vec<u8> {
    jar(vec![stored(inner_name, jar(vec![stored("3.dat", vec![3])]))])
}

fn deep_jar() -> Vec<u8> {
    let level3 = jar(vec![stored("deep.dat", vec![42])]);
    let level2 = jar(vec![stored("level3.jar", level3)]);
    jar(vec![stored("level2.jar", level2)])
}

/// The root archive layout used by every scenario.
pub fn root_jar() -> Vec<u8> {
    jar(vec![
        stored("1.dat", vec![1]),
        stored("2.dat", vec![2]),
        Item::Dir("d/"),
        stored("d/9.dat", vec![9]),
        stored("nested.jar", nested_jar()),
        Item::File(
            "compressed-nested.jar",
            nested_jar(),
            CompressionMethod::Deflated,
        ),
        stored(NESTING[0], nesting_jar("nested.jar")),
        stored(NESTING[1], nesting_jar("nested.jar")),
        stored(NESTING[2], nesting_jar("nested.jar")),
        stored(NESTING[3], nesting_jar("nested.jar")),
        stored("nesting nested 2.jar", nesting_jar("nested 2.jar")),
        stored(OTHER, jar(vec![stored("other.dat", vec![7])])),
        stored("not-an-archive.jar", b"plain bytes".to_vec()),
        stored("deep.jar", deep_jar()),
        stored("empty.jar", jar(Vec::new())),
    ])
}

/// A root whose `not-an-archive.jar` is a real archive holding `3.dat`.
pub fn shadowing_jar() -> Vec<u8> {
    jar(vec![stored("not-an-archive.jar", nested_jar())])
}

/// `jar:file:<canonical path>!/<rest>`.
pub fn url_of(path: &Path, rest: &str) -> String {
    let path = path
        .canonicalize()
        .unwrap()
        .to_string_lossy()
        .replace('\\', "/")
        .trim_start_matches("//?/")
        .to_string();
    let path = if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    };
    format!("jar:file:{}!/{rest}", path.replace(' ', "%20"))
}

/// A temporary directory holding `root.jar`.
pub struct Fixture {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        Self::in_dir(tempfile::tempdir().unwrap())
    }

    /// Place the fixture under `parent`, which may be a relative directory.
    pub fn new_in<P: AsRef<Path>>(parent: P) -> Self {
        Self::in_dir(tempfile::tempdir_in(parent).unwrap())
    }

    fn in_dir(dir: TempDir) -> Self {
        let path = dir.path().join("root.jar");
        std::fs::write(&path, root_jar()).unwrap();
        Self { dir, path }
    }

    /// Absolute path with forward slashes.
    pub fn absolute_path(&self) -> String {
        self.path
            .canonicalize()
            .unwrap()
            .to_string_lossy()
            .replace('\\', "/")
            .trim_start_matches("//?/")
            .to_string()
    }

    /// `jar:file:<canonical root>!/<rest>`.
    pub fn url(&self, rest: &str) -> String {
        url_of(&self.path, rest)
    }

    /// Write `data` next to `root.jar` and return its path.
    pub fn sibling(&self, name: &str, data: Vec<u8>) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }
}
