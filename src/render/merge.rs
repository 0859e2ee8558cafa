//! Concatenation of rendered PDFs into a single document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};
use thiserror::Error;

use crate::utils::write_atomically;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: &[&[u8]] = &[b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Nothing to merge")]
    NoInputs,

    #[error("Failed to read PDF {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("Malformed PDF {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Failed to write merged PDF: {reason}")]
    Write { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes the pages of `inputs`, in order, into `output`.
///
/// A single input is copied unchanged. The output is written to a sibling
/// temporary file and renamed into place, so readers never see a partial file.
pub fn merge_pdfs(inputs: &[PathBuf], output: &Path) -> Result<(), MergeError> {
    let bytes = match inputs {
        [] => return Err(MergeError::NoInputs),
        [single] => std::fs::read(single)?,
        _ => {
            let mut documents = Vec::with_capacity(inputs.len());
            for path in inputs {
                let document = Document::load(path).map_err(|e| MergeError::Load {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                documents.push((path.as_path(), document));
            }
            let mut merged = merge_documents(documents)?;
            let mut buffer = Vec::new();
            merged
                .save_to(&mut buffer)
                .map_err(|e| MergeError::Write {
                    reason: e.to_string(),
                })?;
            buffer
        }
    };

    write_atomically(output, &bytes)?;
    Ok(())
}

fn merge_documents(documents: Vec<(&Path, Document)>) -> Result<Document, MergeError> {
    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for (path, mut document) in documents {
        document.renumber_objects_with(max_id);
        max_id = document.max_id + 1;

        for page_id in document.get_pages().into_values() {
            let page = flattened_page(&document, page_id).map_err(|reason| {
                MergeError::Malformed {
                    path: path.to_path_buf(),
                    reason,
                }
            })?;
            pages.push((page_id, page));
        }
        objects.extend(document.objects);
    }

    let mut merged = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Dictionary)> = None;
    let mut page_tree: Option<(ObjectId, Dictionary)> = None;

    for (object_id, object) in objects {
        match type_of(&object) {
            Some(b"Catalog") => {
                if catalog.is_none() {
                    catalog = object.as_dict().ok().map(|d| (object_id, d.clone()));
                }
            }
            Some(b"Pages") => {
                if page_tree.is_none() {
                    page_tree = object.as_dict().ok().map(|d| (object_id, d.clone()));
                }
            }
            Some(b"Page") | Some(b"Outlines") | Some(b"Outline") => {}
            _ => {
                merged.objects.insert(object_id, object);
            }
        }
    }

    let (pages_id, mut pages_dict) = page_tree.ok_or_else(|| MergeError::Write {
        reason: "no page tree found".to_string(),
    })?;
    let (catalog_id, mut catalog_dict) = catalog.ok_or_else(|| MergeError::Write {
        reason: "no document catalog found".to_string(),
    })?;

    pages_dict.set("Count", Object::Integer(pages.len() as i64));
    pages_dict.set(
        "Kids",
        Object::Array(pages.iter().map(|(id, _)| Object::Reference(*id)).collect()),
    );
    pages_dict.remove(b"Parent");
    merged
        .objects
        .insert(pages_id, Object::Dictionary(pages_dict));

    for (page_id, mut page) in pages {
        page.set("Parent", Object::Reference(pages_id));
        merged.objects.insert(page_id, Object::Dictionary(page));
    }

    catalog_dict.set("Pages", Object::Reference(pages_id));
    catalog_dict.remove(b"Outlines");
    merged
        .objects
        .insert(catalog_id, Object::Dictionary(catalog_dict));
    merged.trailer.set("Root", Object::Reference(catalog_id));

    merged.max_id = max_id;
    merged.renumber_objects();
    merged.compress();
    Ok(merged)
}

/// Copy of the page dictionary with inherited attributes made explicit, so
/// the page renders the same once it hangs off a different page tree.
fn flattened_page(document: &Document, page_id: ObjectId) -> Result<Dictionary, String> {
    let mut page = document
        .get_dictionary(page_id)
        .map_err(|e| e.to_string())?
        .clone();

    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    while let Some(parent_id) = parent {
        let Ok(ancestor) = document.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE {
            if page.has(key) {
                continue;
            }
            if let Ok(value) = ancestor.get(key) {
                page.set(key.to_vec(), value.clone());
            }
        }
        parent = ancestor.get(b"Parent").and_then(Object::as_reference).ok();
    }
    Ok(page)
}

fn type_of(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()?
        .get(b"Type")
        .and_then(Object::as_name)
        .ok()
}
