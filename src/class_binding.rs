use crate::prediction::CLASS_LABELS;
use std::{fs, io, path::Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassBindingError {
    #[error("configured labels {configured:?} do not match the class order {expected:?}")]
    ConfiguredLabels {
        configured: Vec<String>,
        expected: Vec<String>,
    },
    #[error("dataset folders {found:?} in {dir} do not sort into the class order {expected:?}")]
    DatasetFolders {
        dir: String,
        found: Vec<String>,
        expected: Vec<String>,
    },
    #[error("failed to read dataset directory {dir}: {source}")]
    DatasetUnreadable {
        dir: String,
        #[source]
        source: io::Error,
    },
    #[error("model produces {0} logits, expected {expected}", expected = CLASS_LABELS.len())]
    OutputWidth(usize),
}

fn expected_labels() -> Vec<String> {
    CLASS_LABELS.iter().map(|l| l.as_str().to_string()).collect()
}

pub fn verify_configured_labels(configured: &[String]) -> Result<(), ClassBindingError> {
    let expected = expected_labels();
    if configured != expected.as_slice() {
        return Err(ClassBindingError::ConfiguredLabels {
            configured: configured.to_vec(),
            expected,
        });
    }
    Ok(())
}

/// Class indices of a folder-per-class dataset follow the sorted folder names.
pub fn verify_dataset_layout(dir: &Path) -> Result<(), ClassBindingError> {
    let unreadable = |source: io::Error| ClassBindingError::DatasetUnreadable {
        dir: dir.display().to_string(),
        source,
    };

    let mut found = Vec::new();
    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        if entry.file_type().map_err(unreadable)?.is_dir() {
            found.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    found.sort();

    let expected = expected_labels();
    if found != expected {
        return Err(ClassBindingError::DatasetFolders {
            dir: dir.display().to_string(),
            found,
            expected,
        });
    }
    Ok(())
}

pub fn verify_output_width(width: usize) -> Result<(), ClassBindingError> {
    if width != CLASS_LABELS.len() {
        return Err(ClassBindingError::OutputWidth(width));
    }
    Ok(())
}
