use std::fs;

use bundle_pdf::{BundleSession, FileFontProvider, FontFallback, SourceFile};

fn main() {
    let mut session = BundleSession::new();

    let main_doc = fs::read("demos/data/main.pdf").unwrap_or_default();
    if !main_doc.is_empty() {
        session.main = Some(SourceFile::new("main.pdf", main_doc));
    }

    for name in ["contract.pdf", "invoice.pdf"] {
        let data = fs::read(format!("demos/data/{}", name)).unwrap_or_default();
        if !data.is_empty() {
            session.attachments.push(SourceFile::new(name, data));
        }
    }

    let receipt = fs::read("demos/data/receipt.pdf").unwrap_or_default();
    if !receipt.is_empty() {
        session.evidence.push(SourceFile::new("receipt.pdf", receipt));
    }

    session.load_font(&FileFontProvider("demos/data/NotoSansTC-Regular.ttf".into()));
    if session.font.is_none() {
        // No CJK font on hand: render the stamps with the Latin fallback.
        session.options.fallback = FontFallback::Latin;
    }

    let merged = session.assemble().unwrap();
    println!("bundled {} pages", merged.page_count());

    fs::write("bundle.pdf", merged.bytes()).unwrap();
}
