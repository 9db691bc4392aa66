//! Output page schedule for a bundle run.
//!
//! The plan is computed up front from the group structure and the per-file
//! page counts, before any page is copied: one entry per output page, in
//! final order, recording what that page will carry. Keeping this pure
//! keeps the ordering, numbering and padding policy testable without
//! touching PDF bytes.

use std::collections::BTreeSet;

/// Build the label for the `position`-th file (0-based) of a group.
///
/// The label is the literal concatenation of prefix and integer, with no
/// separator and no zero padding: prefix `附件`, start 3, position 1 gives
/// `附件4`.
pub fn label_text(prefix: &str, start_index: u32, position: usize) -> String {
    format!("{}{}", prefix, start_index + position as u32)
}

/// Build the running caption for page `page` of a `total`-page source file.
///
/// Both numbers are scoped to the page's own source file, never to the
/// merged output.
pub fn caption_text(page: u32, total: u32) -> String {
    format!("第 {} 頁 共 {} 頁", page, total)
}

/// One group of files feeding the plan: label prefix, start index and the
/// ordered `(name, page_count)` list.
pub(crate) struct GroupInput<'a> {
    pub prefix: &'a str,
    pub start_index: u32,
    pub files: Vec<(&'a str, u32)>,
}

/// What a single output page will carry once assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PagePlan {
    /// Corner label; present on the first page of each stamped file only.
    pub label: Option<String>,
    /// Caption numbers `(page, total)`; present on every page of a stamped
    /// file, absent on main and pad pages.
    pub caption: Option<(u32, u32)>,
    /// Inserted duplex pad page. Carries no stamp.
    pub pad: bool,
}

impl PagePlan {
    fn blank() -> Self {
        PagePlan {
            label: None,
            caption: None,
            pad: false,
        }
    }

    fn pad_page() -> Self {
        PagePlan {
            label: None,
            caption: None,
            pad: true,
        }
    }
}

/// One source document's slot in the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedPart {
    /// Bookmark title: the generated label, or the main file's name.
    pub title: String,
    /// Page count of the source file itself, pad page excluded.
    pub page_count: u32,
    /// Whether a blank page follows this file in the output.
    pub padded: bool,
}

/// The full output schedule, in final page order.
#[derive(Debug)]
pub(crate) struct BundlePlan {
    pub parts: Vec<PlannedPart>,
    pub pages: Vec<PagePlan>,
}

impl BundlePlan {
    /// Whether any page gets a label or caption at all.
    pub fn has_stamps(&self) -> bool {
        self.pages
            .iter()
            .any(|page| page.label.is_some() || page.caption.is_some())
    }

    /// Every character the stamps will draw, for font preparation.
    pub fn stamp_chars(&self) -> BTreeSet<char> {
        let mut chars = BTreeSet::new();
        for page in &self.pages {
            if let Some(label) = &page.label {
                chars.extend(label.chars());
            }
            if let Some((n, total)) = page.caption {
                chars.extend(caption_text(n, total).chars());
            }
        }
        chars
    }

    /// Whether the stamps need glyphs outside the ASCII range.
    pub fn needs_non_latin(&self) -> bool {
        self.stamp_chars().iter().any(|ch| !ch.is_ascii())
    }
}

/// Compute the schedule for a session: main first, then each attachment,
/// then each evidence file, a pad page after every odd-count file when
/// duplex padding is on. The padding decision looks only at each file's
/// own page count, never at the running output total.
pub(crate) fn build(
    main: Option<(&str, u32)>,
    groups: &[GroupInput<'_>],
    pad_for_duplex: bool,
) -> BundlePlan {
    let mut parts = Vec::new();
    let mut pages = Vec::new();

    if let Some((name, count)) = main {
        let padded = pad_for_duplex && count % 2 == 1;
        for _ in 0..count {
            pages.push(PagePlan::blank());
        }
        if padded {
            pages.push(PagePlan::pad_page());
        }
        parts.push(PlannedPart {
            title: name.to_owned(),
            page_count: count,
            padded,
        });
    }

    for group in groups {
        for (position, &(_, count)) in group.files.iter().enumerate() {
            let label = label_text(group.prefix, group.start_index, position);
            let padded = pad_for_duplex && count % 2 == 1;
            for n in 1..=count {
                pages.push(PagePlan {
                    label: (n == 1).then(|| label.clone()),
                    caption: Some((n, count)),
                    pad: false,
                });
            }
            if padded {
                pages.push(PagePlan::pad_page());
            }
            parts.push(PlannedPart {
                title: label,
                page_count: count,
                padded,
            });
        }
    }

    BundlePlan { parts, pages }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group<'a>(
        prefix: &'a str,
        start_index: u32,
        files: Vec<(&'a str, u32)>,
    ) -> GroupInput<'a> {
        GroupInput {
            prefix,
            start_index,
            files,
        }
    }

    #[test]
    fn labels_concatenate_prefix_and_index() {
        assert_eq!(label_text("附件", 3, 0), "附件3");
        assert_eq!(label_text("附件", 3, 1), "附件4");
        assert_eq!(label_text("證物", 1, 0), "證物1");
    }

    #[test]
    fn caption_scopes_to_the_source_file() {
        assert_eq!(caption_text(1, 3), "第 1 頁 共 3 頁");
        assert_eq!(caption_text(12, 12), "第 12 頁 共 12 頁");
    }

    #[test]
    fn main_pages_carry_no_stamp() {
        let plan = build(Some(("main.pdf", 2)), &[], true);
        assert_eq!(plan.pages.len(), 2);
        assert!(plan.pages.iter().all(|p| p.label.is_none()));
        assert!(plan.pages.iter().all(|p| p.caption.is_none()));
        assert!(!plan.has_stamps());
    }

    #[test]
    fn odd_main_gets_one_pad_page() {
        let plan = build(Some(("main.pdf", 3)), &[], true);
        assert_eq!(plan.pages.len(), 4);
        assert!(plan.pages[3].pad);
        assert!(plan.parts[0].padded);
    }

    #[test]
    fn even_file_gets_no_pad_page() {
        let plan = build(None, &[group("附件", 1, vec![("a.pdf", 4)])], true);
        assert_eq!(plan.pages.len(), 4);
        assert!(plan.pages.iter().all(|p| !p.pad));
    }

    #[test]
    fn pad_sits_directly_after_its_own_file() {
        let plan = build(
            None,
            &[group("附件", 1, vec![("a.pdf", 3), ("b.pdf", 2)])],
            true,
        );
        // a1 a2 a3 pad b1 b2
        assert_eq!(plan.pages.len(), 6);
        assert!(plan.pages[3].pad);
        assert_eq!(plan.pages[4].caption, Some((1, 2)));
    }

    #[test]
    fn padding_disabled_adds_nothing() {
        let plan = build(
            Some(("main.pdf", 1)),
            &[group("附件", 1, vec![("a.pdf", 3)])],
            false,
        );
        assert_eq!(plan.pages.len(), 4);
        assert!(plan.pages.iter().all(|p| !p.pad));
    }

    #[test]
    fn label_lands_on_first_page_only() {
        let plan = build(None, &[group("附件", 3, vec![("a.pdf", 2), ("b.pdf", 2)])], true);
        let labels: Vec<_> = plan.pages.iter().map(|p| p.label.clone()).collect();
        assert_eq!(
            labels,
            vec![
                Some("附件3".to_owned()),
                None,
                Some("附件4".to_owned()),
                None,
            ]
        );
    }

    #[test]
    fn caption_numbers_restart_per_file() {
        let plan = build(None, &[group("證物", 1, vec![("a.pdf", 2), ("b.pdf", 2)])], true);
        let captions: Vec<_> = plan.pages.iter().map(|p| p.caption).collect();
        assert_eq!(
            captions,
            vec![Some((1, 2)), Some((2, 2)), Some((1, 2)), Some((2, 2))]
        );
    }

    #[test]
    fn groups_keep_fixed_order() {
        let plan = build(
            Some(("main.pdf", 1)),
            &[
                group("附件", 1, vec![("a.pdf", 2), ("b.pdf", 2)]),
                group("證物", 1, vec![("e.pdf", 2)]),
            ],
            false,
        );
        let titles: Vec<_> = plan.parts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["main.pdf", "附件1", "附件2", "證物1"]);
        assert_eq!(plan.pages.len(), 7);
    }

    #[test]
    fn caption_always_needs_cjk_glyphs() {
        let plan = build(None, &[group("EXH", 1, vec![("a.pdf", 1)])], false);
        assert!(plan.has_stamps());
        assert!(plan.needs_non_latin());
        let chars = plan.stamp_chars();
        assert!(chars.contains(&'第'));
        assert!(chars.contains(&'頁'));
        assert!(chars.contains(&'共'));
        assert!(chars.contains(&'E'));
    }

    #[test]
    fn main_only_plan_has_no_stamps() {
        let plan = build(Some(("main.pdf", 4)), &[], true);
        assert!(!plan.has_stamps());
        assert!(plan.stamp_chars().is_empty());
    }
}
