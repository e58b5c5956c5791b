//! Synthesized parameter tables for the GRIB decoder.
//!
//! Variables whose encodings the decoder does not recognise natively carry a
//! private parameter definition. The table built from them is rendered as the
//! four local definition files the decoder reads:
//!
//! ```text
//! #Glyoxal
//! '999025' = {
//!     discipline = 0 ;
//!     parameterNumber = 0 ;
//!     ...
//!     }
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::signature::GribSignature;

/// Names of the rendered definition files, in render order.
pub const DEFINITION_FILES: [&str; 4] = ["paramId.def", "shortName.def", "name.def", "units.def"];

/// One synthesized parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterTableEntry {
    pub param_id: u32,
    pub short_name: String,
    pub name: String,
    pub units: String,
    pub frontend_name: String,
    pub signatures: Vec<GribSignature>,
}

impl ParameterTableEntry {
    fn value_for(&self, file: &str) -> String {
        match file {
            "paramId.def" => self.param_id.to_string(),
            "shortName.def" => self.short_name.clone(),
            "name.def" => self.name.clone(),
            _ => self.units.clone(),
        }
    }
}

/// Parameter entries ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterTable {
    entries: Vec<ParameterTableEntry>,
}

impl ParameterTable {
    /// Entries must already be sorted by id and free of duplicates.
    pub(crate) fn from_sorted(entries: Vec<ParameterTableEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ParameterTableEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, param_id: u32) -> Option<&ParameterTableEntry> {
        self.entries
            .binary_search_by_key(&param_id, |e| e.param_id)
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Render the definition files keyed by file name.
    ///
    /// Output depends only on the table contents, so identical tables render
    /// byte-identical files.
    pub fn render_definition_files(&self) -> BTreeMap<&'static str, String> {
        DEFINITION_FILES
            .iter()
            .map(|&file| (file, self.render_file(file)))
            .collect()
    }

    fn render_file(&self, file: &str) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let value = entry.value_for(file);
            for signature in &entry.signatures {
                // Writing to a String cannot fail.
                let _ = writeln!(out, "#{}", entry.name);
                let _ = writeln!(out, "'{}' = {{", value);
                for (key, literal) in signature.iter() {
                    let _ = writeln!(out, "\t {} = {} ;", key, literal.to_definition_literal());
                }
                let _ = writeln!(out, "\t}}");
            }
        }
        out
    }

    /// Write the rendered files into `dir`, creating it if needed.
    pub fn write_definition_files(&self, dir: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut written = Vec::with_capacity(DEFINITION_FILES.len());
        for (file, contents) in self.render_definition_files() {
            let path = dir.join(file);
            fs::write(&path, contents)?;
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn glyoxal() -> ParameterTableEntry {
        ParameterTableEntry {
            param_id: 999025,
            short_name: "glyox".to_string(),
            name: "Glyoxal".to_string(),
            units: "kg m**-3".to_string(),
            frontend_name: "glyoxal".to_string(),
            signatures: vec![GribSignature::new()
                .with("parameterNumber", 0)
                .with("constituentType", 10038)],
        }
    }

    #[test]
    fn test_render_block_format() {
        let table = ParameterTable::from_sorted(vec![glyoxal()]);
        let files = table.render_definition_files();

        assert_eq!(files.len(), 4);
        assert_eq!(
            files["paramId.def"],
            "#Glyoxal\n'999025' = {\n\t constituentType = 10038 ;\n\t parameterNumber = 0 ;\n\t}\n"
        );
        assert!(files["units.def"].starts_with("#Glyoxal\n'kg m**-3' = {"));
        assert!(files["shortName.def"].contains("'glyox' = {"));
    }

    #[test]
    fn test_string_values_are_quoted() {
        let mut entry = glyoxal();
        entry.signatures = vec![GribSignature::new().with("typeOfProcessedData", "fc")];
        let files = ParameterTable::from_sorted(vec![entry]).render_definition_files();
        assert!(files["name.def"].contains("typeOfProcessedData = \"fc\" ;"));
    }

    #[test]
    fn test_get_by_id() {
        let table = ParameterTable::from_sorted(vec![glyoxal()]);
        assert_eq!(table.get(999025).map(|e| e.short_name.as_str()), Some("glyox"));
        assert!(table.get(1).is_none());
    }

    #[test]
    fn test_write_definition_files() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("definitions").join("grib2");
        let table = ParameterTable::from_sorted(vec![glyoxal()]);

        let written = table.write_definition_files(&target).unwrap();
        assert_eq!(written.len(), 4);
        let contents = fs::read_to_string(target.join("name.def")).unwrap();
        assert!(contents.contains("'Glyoxal' = {"));
    }
}
