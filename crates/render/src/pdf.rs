// Paginated document writer (PDF, standard Type1 fonts)

use crate::layout::{layout, BodyStyle, Font, Page, PAGE_HEIGHT, PAGE_WIDTH};
use crate::markdown::{non_empty, normalize_enhancement, score_label};
use crate::rich_text::{parse_blocks, parse_inline, Block, Span};
use crate::{title_for, RenderError};
use chrono::{DateTime, Utc};
use jdmatch_core::domain::{MatchReport, ResultDocument};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use tracing::debug;

/// Render a result document to PDF bytes
pub fn render_pdf(document: &ResultDocument, generated_at: DateTime<Utc>) -> Result<Vec<u8>, RenderError> {
    let title = title_for(document.kind());
    let (blocks, body) = compose(document, title, generated_at);
    let pages = layout(&blocks, body);
    debug!(kind = %document.kind(), pages = pages.len(), "Laid out paginated document");
    write_pdf(&pages, title, generated_at)
}

/// Block structure per document kind, header included
pub fn compose(
    document: &ResultDocument,
    title: &str,
    generated_at: DateTime<Utc>,
) -> (Vec<Block>, BodyStyle) {
    let mut blocks = vec![
        Block::Title(title.to_string()),
        Block::Caption(format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M UTC"))),
    ];

    let body = match document {
        ResultDocument::Match(report) => {
            blocks.extend(match_blocks(report));
            BodyStyle::Report
        }
        ResultDocument::Enhance(report) => {
            let normalized = normalize_enhancement(report.resume_enhancement_md.as_deref().unwrap_or(""));
            blocks.extend(parse_blocks(&normalized));
            BodyStyle::Report
        }
        ResultDocument::CoverLetter(report) => {
            match non_empty(report.cover_letter_md.as_deref()) {
                Some(letter) => blocks.extend(parse_blocks(letter)),
                None => blocks.push(placeholder("No cover letter generated.")),
            }
            BodyStyle::Letter
        }
        ResultDocument::Unknown(value) => {
            let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            blocks.push(Block::Code(pretty));
            BodyStyle::Report
        }
    };

    (blocks, body)
}

fn match_blocks(report: &MatchReport) -> Vec<Block> {
    let section = |name: &str| Block::Heading { level: 2, spans: vec![Span::plain(name)] };
    let list = |items: &[String]| {
        let items: Vec<Vec<Span>> = items
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(parse_inline)
            .collect();
        if items.is_empty() {
            placeholder("None")
        } else {
            Block::Bullets(items)
        }
    };

    vec![
        section("Overall Score"),
        Block::Paragraph(vec![Span::bold(score_label(report))]),
        section("Strengths"),
        list(report.strengths()),
        section("Gaps"),
        list(report.gaps()),
        section("Summary"),
        match non_empty(report.summary.as_deref()) {
            Some(summary) => Block::Paragraph(parse_inline(summary)),
            None => placeholder("No summary provided."),
        },
    ]
}

fn placeholder(text: &str) -> Block {
    Block::Paragraph(vec![Span::italic(text)])
}

/// Encode text for a WinAnsiEncoding font; unmappable characters become `?`
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => b'?',
        })
        .collect()
}

fn page_operations(page: &Page) -> Vec<Operation> {
    let mut ops = Vec::with_capacity(page.runs.len() * 5);
    for run in &page.runs {
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![run.font.resource_name().into(), (run.size.round() as i64).into()],
        ));
        ops.push(Operation::new(
            "Td",
            vec![(run.x.round() as i64).into(), (run.y.round() as i64).into()],
        ));
        ops.push(Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(&run.text))]));
        ops.push(Operation::new("ET", vec![]));
    }
    ops
}

fn pdf_error(err: impl std::fmt::Display) -> RenderError {
    RenderError::Pdf(err.to_string())
}

/// Serialize laid-out pages into a compressed PDF
pub fn write_pdf(pages: &[Page], title: &str, generated_at: DateTime<Utc>) -> Result<Vec<u8>, RenderError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut fonts = Dictionary::new();
    for font in Font::ALL {
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_font(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(font.resource_name(), font_id);
    }
    let resources_id = doc.add_object(dictionary! { "Font" => fonts });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let content = Content { operations: page_operations(page) };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().map_err(pdf_error)?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(PAGE_WIDTH.round() as i64),
                Object::Integer(PAGE_HEIGHT.round() as i64),
            ],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(encode_win_ansi(title)),
        "Producer" => Object::string_literal("jdmatch-render"),
        "CreationDate" => Object::string_literal(generated_at.format("D:%Y%m%d%H%M%SZ").to_string()),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(pdf_error)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use jdmatch_core::domain::{CoverLetterReport, EnhanceReport};
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    fn texts(blocks: &[Block]) -> Vec<String> {
        blocks
            .iter()
            .map(|b| match b {
                Block::Title(t) | Block::Caption(t) | Block::Code(t) => t.clone(),
                Block::Heading { spans, .. } | Block::Paragraph(spans) => crate::rich_text::plain_text(spans),
                Block::Bullets(items) | Block::Numbered(items) => items
                    .iter()
                    .map(|i| crate::rich_text::plain_text(i))
                    .collect::<Vec<_>>()
                    .join("|"),
                Block::Spacer => String::new(),
            })
            .collect()
    }

    #[test]
    fn test_match_sections_in_order() {
        let doc = ResultDocument::from_value(&json!({
            "match_score": 85,
            "strengths": ["Python"],
            "gaps": [],
        }));
        let (blocks, body) = compose(&doc, "Resume / JD Match Report", at());
        assert_eq!(body, BodyStyle::Report);
        assert_eq!(
            texts(&blocks),
            vec![
                "Resume / JD Match Report",
                "Generated: 2024-05-01 09:30 UTC",
                "Overall Score",
                "85%",
                "Strengths",
                "Python",
                "Gaps",
                "None",
                "Summary",
                "No summary provided.",
            ]
        );
        assert_eq!(blocks[7], Block::Paragraph(vec![Span::italic("None")]));
    }

    #[test]
    fn test_enhance_body_is_normalized() {
        let doc = ResultDocument::Enhance(EnhanceReport {
            resume_enhancement_md: Some("Solid.\n- Add metrics".into()),
        });
        let (blocks, _) = compose(&doc, "Resume Enhancement Suggestions", at());
        assert!(blocks.iter().any(|b| matches!(b, Block::Heading { level: 2, spans } if spans[0].text == "Improvements")));
        assert!(blocks.contains(&Block::Bullets(vec![vec![Span::plain("Add metrics")]])));
    }

    #[test]
    fn test_cover_letter_uses_letter_style() {
        let doc = ResultDocument::CoverLetter(CoverLetterReport { cover_letter_md: Some("  ".into()) });
        let (blocks, body) = compose(&doc, "Cover Letter", at());
        assert_eq!(body, BodyStyle::Letter);
        assert_eq!(blocks.last(), Some(&placeholder("No cover letter generated.")));
    }

    #[test]
    fn test_win_ansi_mapping() {
        assert_eq!(encode_win_ansi("a\u{2022}é€"), vec![b'a', 0x95, 0xE9, 0x80]);
        assert_eq!(encode_win_ansi("↔漢"), b"??".to_vec());
    }

    #[test]
    fn test_pdf_loads_back() {
        let doc = ResultDocument::from_value(&json!({"cover_letter_md": "Dear team,\n\nI am **excited** (really)."}));
        let bytes = render_pdf(&doc, at()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let loaded = Document::load_mem(&bytes).unwrap();
        assert_eq!(loaded.get_pages().len(), 1);
    }

    #[test]
    fn test_long_document_spans_pages() {
        let body: String = (0..150).map(|i| format!("- Suggestion number {}\n", i)).collect();
        let doc = ResultDocument::Enhance(EnhanceReport { resume_enhancement_md: Some(body) });
        let bytes = render_pdf(&doc, at()).unwrap();
        let loaded = Document::load_mem(&bytes).unwrap();
        assert!(loaded.get_pages().len() >= 2);
    }
}
