//! Concatenation of PDF documents.
//!
//! Pages are emitted in input order: every page of document 0, then
//! document 1, and so on. Attributes a page inherits from its page tree
//! (`Resources`, `MediaBox`, `CropBox`, `Rotate`) are copied onto the
//! page itself before it is re-parented, so each page keeps rendering
//! with its own document's resources. Outlines are dropped.

use std::collections::BTreeSet;

use lopdf::{Dictionary, Document, Object, ObjectId};

/// Page attributes a page may inherit from an ancestor `Pages` node.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic `Parent` chains in broken files.
const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("no documents to merge")]
    NoDocuments,

    #[error("document {index} is not a valid PDF: {reason}")]
    Parse { index: usize, reason: String },

    #[error("document {index} has no pages")]
    NoPages { index: usize },

    #[error("document {index} has no {object} object")]
    MissingObject { index: usize, object: &'static str },

    #[error("failed to serialize merged document: {0}")]
    Write(String),
}

/// Merge `documents` into one PDF, preserving their order.
pub fn merge_pdfs(documents: &[Vec<u8>]) -> Result<Vec<u8>, MergeError> {
    if documents.is_empty() {
        return Err(MergeError::NoDocuments);
    }

    let mut merged = Document::with_version("1.5");
    let mut next_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut catalog: Option<(ObjectId, Dictionary)> = None;
    let mut page_root: Option<(ObjectId, Dictionary)> = None;

    for (index, bytes) in documents.iter().enumerate() {
        let mut doc = Document::load_mem(bytes).map_err(|e| MergeError::Parse {
            index,
            reason: e.to_string(),
        })?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(MergeError::NoPages { index });
        }

        for page_id in &page_ids {
            let mut page = doc
                .get_object(*page_id)
                .and_then(Object::as_dict)
                .map_err(|e| MergeError::Parse {
                    index,
                    reason: e.to_string(),
                })?
                .clone();
            inherit_attributes(&doc, &mut page);
            pages.push((*page_id, page));
        }

        let page_set: BTreeSet<ObjectId> = page_ids.into_iter().collect();
        let mut saw_catalog = false;

        for (id, object) in doc.objects {
            if page_set.contains(&id) {
                continue;
            }
            match type_of(&object) {
                Some(b"Catalog") => {
                    saw_catalog = true;
                    if catalog.is_none() {
                        catalog = dictionary_of(object).map(|d| (id, d));
                    }
                }
                Some(b"Pages") => {
                    if page_root.is_none() {
                        page_root = dictionary_of(object).map(|d| (id, d));
                    }
                }
                Some(b"Outlines") | Some(b"Outline") => {}
                _ => {
                    merged.objects.insert(id, object);
                }
            }
        }

        if !saw_catalog {
            return Err(MergeError::MissingObject {
                index,
                object: "Catalog",
            });
        }
    }

    let (root_id, mut root) = page_root.ok_or(MergeError::MissingObject {
        index: 0,
        object: "Pages",
    })?;
    let (catalog_id, mut catalog) = catalog.ok_or(MergeError::MissingObject {
        index: 0,
        object: "Catalog",
    })?;

    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
    let count = pages.len() as i64;

    for (id, mut page) in pages {
        page.set("Parent", root_id);
        merged.objects.insert(id, Object::Dictionary(page));
    }

    root.remove(b"Parent");
    root.set("Kids", kids);
    root.set("Count", count);
    merged.objects.insert(root_id, Object::Dictionary(root));

    catalog.set("Pages", root_id);
    catalog.remove(b"Outlines");
    merged.objects.insert(catalog_id, Object::Dictionary(catalog));

    merged.trailer.set("Root", catalog_id);
    merged.max_id = merged.objects.keys().map(|(id, _)| *id).max().unwrap_or(0);
    merged.compress();

    let mut out = Vec::new();
    merged
        .save_to(&mut out)
        .map_err(|e| MergeError::Write(e.to_string()))?;
    Ok(out)
}

/// Value of the `/Type` entry of a dictionary or stream.
fn type_of(object: &Object) -> Option<&[u8]> {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return None,
    };
    match dict.get(b"Type").ok()? {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

fn dictionary_of(object: Object) -> Option<Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Copy inheritable attributes from the page's ancestors onto the page.
fn inherit_attributes(doc: &Document, page: &mut Dictionary) {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(parent_id) = parent {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = doc.get_object(parent_id).and_then(Object::as_dict) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
}
