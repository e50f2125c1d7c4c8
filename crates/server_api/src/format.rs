use anyhow::{anyhow, Context, Result};
use csv::WriterBuilder;
use listing::{ExportTable, Formatter};
use lopdf::{
    content::{Content, Operation},
    dictionary, Document, Object, Stream,
};

const PAGE_WIDTH: i64 = 842;
const PAGE_HEIGHT: i64 = 595;
const MARGIN: i64 = 36;
const FONT_SIZE: i64 = 8;
const LEADING: i64 = 11;
const MAX_LINE_CHARS: usize = 180;

/// Renders export tables as CSV spreadsheets and landscape A4 PDFs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn to_spreadsheet(&self, table: &ExportTable) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new().from_writer(Vec::new());
        writer
            .write_record(&table.headers)
            .context("write csv header")?;
        for row in &table.rows {
            writer.write_record(row).context("write csv row")?;
        }
        writer
            .into_inner()
            .map_err(|err| anyhow!("flush csv: {}", err.error()))
    }

    fn to_pdf(&self, table: &ExportTable) -> Result<Vec<u8>> {
        render_pdf(table)
    }
}

fn column_widths(table: &ExportTable) -> Vec<usize> {
    let mut widths: Vec<usize> = table.headers.iter().map(|h| h.chars().count()).collect();
    for row in &table.rows {
        for (index, cell) in row.iter().enumerate() {
            let len = cell.chars().count();
            match widths.get_mut(index) {
                Some(width) => *width = (*width).max(len),
                None => widths.push(len),
            }
        }
    }
    widths
}

fn text_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::new();
    for (index, cell) in cells.iter().enumerate() {
        if index > 0 {
            line.push_str("  ");
        }
        let width = widths.get(index).copied().unwrap_or_default();
        line.push_str(&format!("{cell:<width$}"));
    }
    line.trim_end().chars().take(MAX_LINE_CHARS).collect()
}

/// Courier under WinAnsiEncoding only covers Latin-1; anything wider
/// becomes `?`.
fn latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| u8::try_from(u32::from(ch)).unwrap_or(b'?'))
        .collect()
}

fn page_content(lines: &[String]) -> Content {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
        Operation::new("TL", vec![LEADING.into()]),
        Operation::new("Td", vec![MARGIN.into(), (PAGE_HEIGHT - MARGIN).into()]),
    ];
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(latin1(line))]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));
    Content { operations }
}

fn render_pdf(table: &ExportTable) -> Result<Vec<u8>> {
    let widths = column_widths(table);
    let mut lines = vec![table.title.clone(), String::new(), text_line(&table.headers, &widths)];
    lines.extend(table.rows.iter().map(|row| text_line(row, &widths)));
    let lines_per_page = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page_lines in lines.chunks(lines_per_page.max(1)) {
        let content = page_content(page_lines)
            .encode()
            .context("encode pdf page content")?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = i64::try_from(kids.len()).unwrap_or(i64::MAX);
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).context("write pdf")?;
    Ok(out)
}
