use std::fs;

use bundle_pdf::{BundleSession, SourceFile, StaticFontProvider};

fn main() {
    let doc_mem = fs::read("demos/data/pdf_example.pdf").unwrap_or_default();
    let font_mem = fs::read("demos/data/NotoSansTC-Regular.ttf").unwrap_or_default();

    let mut session = BundleSession::new();
    session.attachments.start_index = 3;
    session
        .attachments
        .push(SourceFile::new("pdf_example.pdf", doc_mem));
    session.options.label_size_pt = 27.0;

    session.load_font(&StaticFontProvider(font_mem));

    // Labels continue from 附件3; every page gets its own 第 n 頁 caption.
    let merged = session.assemble().unwrap();

    fs::write("stamped.pdf", merged.bytes()).unwrap();
}
