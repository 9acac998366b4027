use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::io::Read;
use std::path::Path;

/// One (title, URL) row of the input.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    /// 1-based record number within the input, headers excluded.
    pub row: usize,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct InputFormat {
    pub delimiter: u8,
    /// When set, the first row is a header with `Title` and `URL` columns.
    pub has_headers: bool,
}

impl Default for InputFormat {
    fn default() -> Self {
        Self {
            delimiter: b';',
            has_headers: false,
        }
    }
}

/// Read all work items from a CSV file.
pub fn read_work_items(path: &Path, format: &InputFormat) -> Result<Vec<WorkItem>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open input {}", path.display()))?;
    parse_work_items(file, format).with_context(|| format!("Failed to parse {}", path.display()))
}

fn column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

pub fn parse_work_items<R: Read>(reader: R, format: &InputFormat) -> Result<Vec<WorkItem>> {
    let mut csv_reader = ReaderBuilder::new()
        .delimiter(format.delimiter)
        .has_headers(format.has_headers)
        .flexible(true)
        .from_reader(reader);

    // Without headers the first two columns are title and URL.
    let (title_col, url_col) = if format.has_headers {
        let headers = csv_reader.headers().context("Failed to read header row")?;
        (
            column(headers, "title").context("Header row has no Title column")?,
            column(headers, "url").context("Header row has no URL column")?,
        )
    } else {
        (0, 1)
    };

    // Short rows yield empty cells; the batch rejects them as single items.
    let mut items = Vec::new();
    for (i, result) in csv_reader.records().enumerate() {
        let record = result.with_context(|| format!("Bad record {}", i + 1))?;
        items.push(WorkItem {
            row: i + 1,
            title: record.get(title_col).unwrap_or_default().to_string(),
            url: record.get(url_col).unwrap_or_default().trim().to_string(),
        });
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_semicolon_without_headers() {
        let data = "Intro Video;https://example.com/a\nOutro: Part 2;https://example.com/b\n";
        let items = parse_work_items(data.as_bytes(), &InputFormat::default()).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0],
            WorkItem {
                row: 1,
                title: "Intro Video".to_string(),
                url: "https://example.com/a".to_string(),
            }
        );
        assert_eq!(items[1].title, "Outro: Part 2");
        assert_eq!(items[1].row, 2);
    }

    #[test]
    fn test_parse_comma_with_headers() {
        let data = "Title,URL\n\"Hello, World\",https://example.com/x\n";
        let format = InputFormat {
            delimiter: b',',
            has_headers: true,
        };
        let items = parse_work_items(data.as_bytes(), &format).unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Hello, World");
        assert_eq!(items[0].url, "https://example.com/x");
    }

    #[test]
    fn test_short_row_with_headers_yields_empty_url() {
        let data = "Title,URL\nA,https://x/a\nB\nC,https://x/c\n";
        let format = InputFormat {
            delimiter: b',',
            has_headers: true,
        };
        let items = parse_work_items(data.as_bytes(), &format).unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[1].title, "B");
        assert!(items[1].url.is_empty());
        assert_eq!(items[2].url, "https://x/c");
    }

    #[test]
    fn test_header_columns_in_any_order() {
        let data = "url;Title\nhttps://x/a;First\n";
        let format = InputFormat {
            delimiter: b';',
            has_headers: true,
        };
        let items = parse_work_items(data.as_bytes(), &format).unwrap();
        assert_eq!(items[0].title, "First");
        assert_eq!(items[0].url, "https://x/a");

        let missing = parse_work_items("Name;Link\na;b\n".as_bytes(), &format);
        assert!(missing.is_err());
    }

    #[test]
    fn test_short_row_yields_empty_url() {
        let items = parse_work_items("Only a title\n".as_bytes(), &InputFormat::default()).unwrap();
        assert_eq!(items[0].title, "Only a title");
        assert!(items[0].url.is_empty());
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = read_work_items(Path::new("/definitely/not/here.csv"), &InputFormat::default());
        assert!(result.is_err());
    }
}
