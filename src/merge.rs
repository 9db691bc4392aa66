//! Concatenating the stamped documents into one output document.

use std::collections::BTreeMap;

use lopdf::{dictionary, Bookmark, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};
use crate::stamp;

/// One source document queued for concatenation, in output order.
pub(crate) struct MergePart {
    /// Outline title: the generated label, or the main file's name.
    pub title: String,
    pub document: Document,
}

/// Concatenate the parts into a single document.
///
/// Object ids are renumbered across documents so they cannot collide;
/// pages are collected in each document's own page order and the Pages
/// tree is rebuilt flat in that order. Each part gets one outline
/// bookmark on its first page.
pub(crate) fn concat_documents(parts: Vec<MergePart>) -> Result<Document> {
    let mut max_id = 1;

    let mut documents_pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut documents_objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut bookmarks: Vec<(String, ObjectId)> = Vec::new();
    let mut document = Document::with_version("1.5");

    for part in parts {
        let mut doc = part.document;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let mut first_page = None;
        for object_id in doc.get_pages().into_values() {
            if first_page.is_none() {
                first_page = Some(object_id);
            }
            let object = doc.get_object(object_id)?.to_owned();
            documents_pages.push((object_id, object));
        }
        if let Some(page_id) = first_page {
            bookmarks.push((part.title, page_id));
        }
        documents_objects.extend(doc.objects);
    }

    // Catalog and Pages are mandatory
    let mut catalog_object: Option<(ObjectId, Object)> = None;
    let mut pages_object: Option<(ObjectId, Object)> = None;

    // Process all objects except "Page" type
    for (object_id, object) in documents_objects.iter() {
        // "Page" objects are handled later; outlines are rebuilt from the
        // per-part bookmarks instead of being carried over.
        match object.type_name().unwrap_or(b"") {
            b"Catalog" => {
                // Collect a first "Catalog" object and use it for the future "Pages"
                catalog_object = Some((
                    if let Some((id, _)) = catalog_object {
                        id
                    } else {
                        *object_id
                    },
                    object.clone(),
                ));
            }
            b"Pages" => {
                // Collect and update a first "Pages" object and use it for the future "Catalog"
                // We have also to merge all dictionaries of the old and the new "Pages" object
                if let Ok(dictionary) = object.as_dict() {
                    let mut dictionary = dictionary.clone();
                    if let Some((_, ref object)) = pages_object {
                        if let Ok(old_dictionary) = object.as_dict() {
                            dictionary.extend(old_dictionary);
                        }
                    }

                    pages_object = Some((
                        if let Some((id, _)) = pages_object {
                            id
                        } else {
                            *object_id
                        },
                        Object::Dictionary(dictionary),
                    ));
                }
            }
            b"Page" => {}
            b"Outlines" => {}
            b"Outline" => {}
            _ => {
                document.objects.insert(*object_id, object.clone());
            }
        }
    }

    let Some(pages_object) = pages_object else {
        return Err(Error::Corrupt("Pages root not found".to_owned()));
    };
    let Some(catalog_object) = catalog_object else {
        return Err(Error::Corrupt("Catalog root not found".to_owned()));
    };

    // Reparent every page onto the surviving "Pages" node
    for (object_id, object) in documents_pages.iter() {
        if let Ok(dictionary) = object.as_dict() {
            let mut dictionary = dictionary.clone();
            dictionary.set("Parent", pages_object.0);

            document
                .objects
                .insert(*object_id, Object::Dictionary(dictionary));
        }
    }

    // Build a new "Pages" with updated fields
    if let Ok(dictionary) = pages_object.1.as_dict() {
        let mut dictionary = dictionary.clone();

        dictionary.set("Count", documents_pages.len() as u32);
        dictionary.set(
            "Kids",
            documents_pages
                .iter()
                .map(|(object_id, _)| Object::Reference(*object_id))
                .collect::<Vec<_>>(),
        );

        document
            .objects
            .insert(pages_object.0, Object::Dictionary(dictionary));
    }

    // Build a new "Catalog" with updated fields
    if let Ok(dictionary) = catalog_object.1.as_dict() {
        let mut dictionary = dictionary.clone();
        dictionary.set("Pages", pages_object.0);
        dictionary.remove(b"Outlines");

        document
            .objects
            .insert(catalog_object.0, Object::Dictionary(dictionary));
    }

    document.trailer.set("Root", catalog_object.0);

    for (title, page_id) in bookmarks {
        document.add_bookmark(Bookmark::new(title, [0.0, 0.0, 0.0], 0, page_id), None);
    }

    // Update the max internal ID as wasn't updated before due to direct objects insertion
    document.max_id = document.objects.len() as u32;

    // Reorder all new Document objects
    document.renumber_objects();

    document.adjust_zero_pages();

    // Renumbering has remapped every id; find the catalog again through
    // the trailer before attaching the outline.
    if let Some(outline_id) = document.build_outline() {
        if let Some(Object::Reference(catalog_id)) = document.trailer.get(b"Root").ok().cloned() {
            if let Ok(Object::Dictionary(dict)) = document.get_object_mut(catalog_id) {
                dict.set("Outlines", Object::Reference(outline_id));
            }
        }
    }

    document.compress();

    Ok(document)
}

/// Append one blank page to the end of `doc` for duplex padding.
///
/// The page inherits the last page's media box and carries an empty
/// content stream; it is never stamped.
pub(crate) fn append_blank_page(doc: &mut Document) -> Result<()> {
    let catalog_id = match doc.trailer.get(b"Root")? {
        Object::Reference(id) => *id,
        _ => return Err(Error::Corrupt("trailer Root is not a reference".to_owned())),
    };
    let pages_id = match doc.get_object(catalog_id)?.as_dict()?.get(b"Pages")? {
        Object::Reference(id) => *id,
        _ => return Err(Error::Corrupt("Catalog Pages is not a reference".to_owned())),
    };

    let media_box = doc
        .get_pages()
        .into_values()
        .last()
        .map(|page_id| stamp::media_box(doc, page_id))
        .unwrap_or(stamp::DEFAULT_MEDIA_BOX);

    let content_id = doc.add_object(Object::Stream(Stream::new(Dictionary::new(), Vec::new())));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "MediaBox" => media_box.iter().map(|&v| v.into()).collect::<Vec<Object>>(),
        "Resources" => Dictionary::new(),
        "Contents" => Object::Reference(content_id),
    });

    let pages = doc.get_object_mut(pages_id)?.as_dict_mut()?;
    let count = pages
        .get(b"Count")
        .ok()
        .and_then(|count| count.as_i64().ok())
        .unwrap_or(0);
    match pages.get_mut(b"Kids") {
        Ok(Object::Array(kids)) => kids.push(Object::Reference(page_id)),
        _ => return Err(Error::Corrupt("Pages tree has no Kids array".to_owned())),
    }
    pages.set("Count", count + 1);

    Ok(())
}
