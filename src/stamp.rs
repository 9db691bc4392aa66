//! Applying the plan's stamps to the merged document.
//!
//! Each stamped page receives one additional content stream appended to
//! its `Contents`; the original streams are never decoded or re-encoded,
//! so source pages stay byte-identical. Positions are offsets from each
//! page's own media box, not absolute coordinates.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};
use crate::font::PreparedFont;
use crate::plan::{caption_text, BundlePlan};

/// Corner offsets, measured from the page's own media box edges.
const LABEL_MARGIN_X: f64 = 42.0;
const LABEL_MARGIN_Y: f64 = 34.0;
const CAPTION_MARGIN_X: f64 = 42.0;
const CAPTION_MARGIN_Y: f64 = 22.0;

/// Caption size is fixed so the running page numbers stay legible
/// whatever label size the user picks.
const CAPTION_SIZE: f64 = 10.0;

/// Resource name for the stamping font; prefixed to dodge collisions
/// with fonts the source pages already reference.
const FONT_RESOURCE: &str = "BdF1";

/// Fallback media box: A4 portrait.
pub(crate) const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 595.28, 841.89];

/// Stamp every planned page of the merged document.
pub(crate) fn apply_stamps(
    doc: &mut Document,
    plan: &BundlePlan,
    font: &PreparedFont,
    label_size: f64,
) -> Result<()> {
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    if page_ids.len() != plan.pages.len() {
        return Err(Error::Corrupt(format!(
            "merged document has {} pages, plan expected {}",
            page_ids.len(),
            plan.pages.len()
        )));
    }

    for (&page_id, page_plan) in page_ids.iter().zip(&plan.pages) {
        if page_plan.label.is_none() && page_plan.caption.is_none() {
            continue;
        }
        let media = media_box(doc, page_id);

        let mut ops = vec![
            Operation::new("q", vec![]),
            Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
            Operation::new("Tr", vec![0.into()]),
        ];
        if let Some(text) = &page_plan.label {
            let x = media[2] - LABEL_MARGIN_X - font.text_width(text, label_size);
            let y = media[3] - LABEL_MARGIN_Y;
            push_text(&mut ops, font, text, label_size, x.max(media[0]), y);
        }
        if let Some((n, total)) = page_plan.caption {
            let text = caption_text(n, total);
            let x = media[2] - CAPTION_MARGIN_X - font.text_width(&text, CAPTION_SIZE);
            let y = media[1] + CAPTION_MARGIN_Y;
            push_text(&mut ops, font, &text, CAPTION_SIZE, x.max(media[0]), y);
        }
        ops.push(Operation::new("Q", vec![]));

        let encoded = Content { operations: ops }.encode()?;
        let stream_id = doc.add_object(Object::Stream(Stream::new(Dictionary::new(), encoded)));
        append_page_content(doc, page_id, stream_id)?;
        register_font(doc, page_id, font.font_id())?;
    }

    Ok(())
}

fn push_text(
    ops: &mut Vec<Operation>,
    font: &PreparedFont,
    text: &str,
    size: f64,
    x: f64,
    y: f64,
) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![FONT_RESOURCE.into(), size.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new("Tj", vec![font.encode(text)]));
    ops.push(Operation::new("ET", vec![]));
}

/// Resolve a page's media box, following indirect values and walking up
/// the Pages tree for inherited ones, with a depth limit against
/// malformed parent cycles.
pub(crate) fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    fn lookup(doc: &Document, object: &Object, depth: usize) -> Option<[f64; 4]> {
        if depth == 0 {
            return None;
        }
        let dict = object.as_dict().ok()?;
        if let Ok(entry) = dict.get(b"MediaBox") {
            let array = match entry {
                Object::Array(array) => Some(array.clone()),
                Object::Reference(id) => doc
                    .get_object(*id)
                    .ok()
                    .and_then(|o| o.as_array().ok())
                    .cloned(),
                _ => None,
            };
            if let Some(array) = array {
                let values: Vec<f64> = array.iter().filter_map(number).collect();
                if values.len() == 4 {
                    return Some([values[0], values[1], values[2], values[3]]);
                }
            }
        }
        if let Ok(Object::Reference(parent_id)) = dict.get(b"Parent") {
            return lookup(doc, doc.get_object(*parent_id).ok()?, depth - 1);
        }
        None
    }

    doc.get_object(page_id)
        .ok()
        .and_then(|object| lookup(doc, object, 10))
        .unwrap_or(DEFAULT_MEDIA_BOX)
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

/// Append a content stream to a page, preserving whatever `Contents`
/// shape the page already has.
fn append_page_content(doc: &mut Document, page_id: ObjectId, content_id: ObjectId) -> Result<()> {
    let page = doc.get_object_mut(page_id)?;
    if let Object::Dictionary(dict) = page {
        let existing = dict.get(b"Contents").ok().cloned();
        match existing {
            Some(Object::Reference(existing_id)) => {
                dict.set(
                    "Contents",
                    Object::Array(vec![
                        Object::Reference(existing_id),
                        Object::Reference(content_id),
                    ]),
                );
            }
            Some(Object::Array(mut array)) => {
                array.push(Object::Reference(content_id));
                dict.set("Contents", Object::Array(array));
            }
            _ => {
                dict.set("Contents", Object::Reference(content_id));
            }
        }
    }
    Ok(())
}

/// Make the stamping font reachable from the page's resources.
///
/// Resources may be inline, indirect, or inherited from the Pages tree;
/// the page gets its own inline copy with the font entry added, which
/// shadows inheritance without touching shared dictionaries.
fn register_font(doc: &mut Document, page_id: ObjectId, font_id: ObjectId) -> Result<()> {
    let mut resources = effective_resources(doc, page_id).unwrap_or_default();
    let mut fonts = match resources.get(b"Font") {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => Dictionary::new(),
    };
    fonts.set(FONT_RESOURCE, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

fn effective_resources(doc: &Document, page_id: ObjectId) -> Option<Dictionary> {
    let mut current = doc.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..10 {
        if let Ok(entry) = current.get(b"Resources") {
            return match entry {
                Object::Dictionary(dict) => Some(dict.clone()),
                Object::Reference(id) => {
                    doc.get_object(*id).ok()?.as_dict().ok().cloned()
                }
                _ => None,
            };
        }
        match current.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => {
                current = doc.get_object(*parent_id).ok()?.as_dict().ok()?;
            }
            _ => break,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn doc_with_inherited_media_box() -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
        });
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        if let Ok(page) = doc.get_object_mut(page_id) {
            if let Ok(dict) = page.as_dict_mut() {
                dict.set("Parent", Object::Reference(pages_id));
            }
        }
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        (doc, page_id)
    }

    #[test]
    fn media_box_walks_up_to_the_pages_node() {
        let (doc, page_id) = doc_with_inherited_media_box();
        assert_eq!(media_box(&doc, page_id), [0.0, 0.0, 612.0, 792.0]);
    }

    #[test]
    fn media_box_defaults_to_a4_when_absent() {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        assert_eq!(media_box(&doc, page_id), DEFAULT_MEDIA_BOX);
    }

    #[test]
    fn appended_content_becomes_an_array() {
        let (mut doc, page_id) = doc_with_inherited_media_box();
        let first = doc.add_object(Object::Stream(Stream::new(
            Dictionary::new(),
            b"q Q".to_vec(),
        )));
        if let Ok(dict) = doc.get_object_mut(page_id).unwrap().as_dict_mut() {
            dict.set("Contents", Object::Reference(first));
        }
        let second = doc.add_object(Object::Stream(Stream::new(
            Dictionary::new(),
            b"q Q".to_vec(),
        )));
        append_page_content(&mut doc, page_id, second).unwrap();

        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let contents = page.get(b"Contents").unwrap().as_array().unwrap();
        assert_eq!(contents.len(), 2);
    }

    #[test]
    fn register_font_keeps_inherited_resources() {
        let (mut doc, page_id) = doc_with_inherited_media_box();
        let pages_id = match doc
            .get_object(page_id)
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"Parent")
            .unwrap()
        {
            Object::Reference(id) => *id,
            _ => unreachable!(),
        };
        if let Ok(dict) = doc.get_object_mut(pages_id).unwrap().as_dict_mut() {
            dict.set(
                "Resources",
                dictionary! { "ProcSet" => vec![Object::Name(b"PDF".to_vec())] },
            );
        }
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        register_font(&mut doc, page_id, font_id).unwrap();

        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        assert!(resources.has(b"ProcSet"));
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        assert!(fonts.has(FONT_RESOURCE.as_bytes()));
    }
}
