use clap::Parser;
use searchcore::{
    Analyzer, ErrorKind, IndexReader, QueryParser, SearchConfig, SearchError, Searcher, StoredDocument,
};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const EXIT_OK: u8 = 0;
pub const EXIT_QUERY_SYNTAX: u8 = 1;
pub const EXIT_ARGUMENTS: u8 = 2;
pub const EXIT_EMPTY_INDEX: u8 = 3;
pub const EXIT_INDEX: u8 = 4;

#[derive(Parser, Debug)]
#[command(name = "retriever")]
#[command(about = "Search an index and print the results as HTML", long_about = None)]
pub struct Cli {
    /// Directory of the index files to be searched
    #[arg(short = 'i', long = "index")]
    pub index: PathBuf,
    /// The search query string
    #[arg(short = 'q', long = "query", allow_hyphen_values = true)]
    pub query: String,
}

const LONG_OPTIONS: &[&str] = &["index", "query", "help"];

/// Options whose next argument is a value and must be passed through as is.
const VALUE_OPTIONS: &[&str] = &["i", "q", "index", "query"];

/// Accept the single-dash long options (`-index`, `-query`, `-help`) next to
/// clap's `--index` style. Option values are never rewritten.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut value_next = false;
    args.into_iter()
        .map(|arg| {
            if std::mem::take(&mut value_next) {
                return arg;
            }
            let rewritten = arg.to_str().and_then(|s| {
                let name = s.strip_prefix("--").or_else(|| s.strip_prefix('-'))?;
                value_next = VALUE_OPTIONS.contains(&name);
                (!s.starts_with("--") && LONG_OPTIONS.contains(&name)).then(|| OsString::from(format!("-{s}")))
            });
            rewritten.unwrap_or(arg)
        })
        .collect()
}

/// One rendered result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub rank: usize,
    pub score: f32,
    pub title: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    pub query: String,
    /// Name of the directory the indexed documents came from.
    pub directory: String,
    pub total_hits: usize,
    pub hits: Vec<Hit>,
}

/// Parse the query, open the index, run the query and resolve the top hits.
///
/// A malformed query is reported before the index is touched, so it wins over
/// a missing or empty index.
pub fn search(index: &Path, query: &str, config: &SearchConfig) -> searchcore::Result<ResultPage> {
    let parsed = QueryParser::new(Analyzer::new(config.analyzer.clone())).parse(query)?;
    tracing::debug!(?parsed, "parsed query");

    let reader = IndexReader::open(index, &config.analyzer)?;
    if reader.total_docs() == 0 {
        return Err(SearchError::EmptyIndex);
    }

    let searcher = Searcher::new(&reader);
    let top = searcher.search(&parsed, config.hits_per_page)?;
    let mut hits = Vec::with_capacity(top.hits.len());
    for (i, hit) in top.hits.iter().enumerate() {
        let doc = searcher.resolve(hit)?;
        hits.push(Hit { rank: i + 1, score: hit.score, title: doc.title().to_string(), path: doc.path().to_string() });
    }
    let directory = directory_name(&reader.document(0)?);
    Ok(ResultPage { query: query.to_string(), directory, total_hits: top.total_hits, hits })
}

fn directory_name(doc: &StoredDocument) -> String {
    Path::new(doc.path())
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn render_html<W: Write>(page: &ResultPage, out: &mut W) -> std::io::Result<()> {
    let query = escape_html(&page.query);
    let dir = escape_html(&page.directory);
    writeln!(out, "<!DOCTYPE html PUBLIC \"-//W3C//DTD HTML 4.01 Transitional//EN\"")?;
    writeln!(out, "\"http://www.w3.org/TR/html4/loose.dtd\">")?;
    writeln!(out, "<html>")?;
    writeln!(out, "<head>")?;
    writeln!(out, "<meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\">")?;
    writeln!(out, "<title>Results for query {query} in directory {dir}</title>")?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body>")?;
    writeln!(out, "<h1>Results for query <u>{query}</u> in directory <u>{dir}</u></h1>")?;
    for hit in &page.hits {
        writeln!(
            out,
            "<p><b><i>{}</i>. {}</b><br><span style='margin-left:3em'>{}</span></p>",
            hit.rank,
            escape_html(&hit.title),
            escape_html(&hit.path)
        )?;
    }
    writeln!(out, "</body>")?;
    writeln!(out, "</html>")?;
    Ok(())
}

pub fn exit_code(err: &SearchError) -> u8 {
    match err.kind() {
        ErrorKind::QuerySyntax => EXIT_QUERY_SYNTAX,
        ErrorKind::EmptyIndex => EXIT_EMPTY_INDEX,
        _ => EXIT_INDEX,
    }
}

/// Run one query invocation, writing HTML to `out` and diagnostics to
/// `err`. Returns the process exit code.
pub fn run<W: Write, E: Write>(cli: &Cli, config: &SearchConfig, out: &mut W, err: &mut E) -> u8 {
    match search(&cli.index, &cli.query, config) {
        Ok(page) => {
            tracing::info!(total_hits = page.total_hits, shown = page.hits.len(), "search complete");
            match render_html(&page, out) {
                Ok(()) => EXIT_OK,
                Err(e) => {
                    let _ = writeln!(err, "Error writing results: {e}");
                    EXIT_INDEX
                }
            }
        }
        Err(SearchError::EmptyIndex) => {
            let _ = writeln!(err, "No document in the index!");
            EXIT_EMPTY_INDEX
        }
        Err(e @ SearchError::QuerySyntax { .. }) => {
            let _ = writeln!(err, "Error parsing the query string \"{}\": {e}", cli.query);
            exit_code(&e)
        }
        Err(e) => {
            let _ = writeln!(err, "Error opening index {}: {e}", cli.index.display());
            exit_code(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn parses_single_dash_options() {
        let args: Vec<OsString> = ["retriever", "-index", "idx", "-query", "cat dog"].iter().map(OsString::from).collect();
        let cli = Cli::try_parse_from(normalize_args(args)).unwrap();
        assert_eq!(cli.index, PathBuf::from("idx"));
        assert_eq!(cli.query, "cat dog");
    }

    #[test]
    fn query_may_start_with_a_dash() {
        let args: Vec<OsString> = ["retriever", "-i", "idx", "-q", "-dog"].iter().map(OsString::from).collect();
        let cli = Cli::try_parse_from(normalize_args(args)).unwrap();
        assert_eq!(cli.query, "-dog");
    }

    #[test]
    fn option_values_are_not_rewritten() {
        let args: Vec<OsString> = ["retriever", "-i", "idx", "-q", "-help"].iter().map(OsString::from).collect();
        let cli = Cli::try_parse_from(normalize_args(args)).unwrap();
        assert_eq!(cli.query, "-help");

        let args: Vec<OsString> = ["retriever", "-query", "-index", "-index", "idx"].iter().map(OsString::from).collect();
        let cli = Cli::try_parse_from(normalize_args(args)).unwrap();
        assert_eq!(cli.query, "-index");
        assert_eq!(cli.index, PathBuf::from("idx"));
    }

    #[test]
    fn help_exits_zero() {
        let args: Vec<OsString> = ["retriever", "-help"].iter().map(OsString::from).collect();
        let err = Cli::try_parse_from(normalize_args(args)).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn renders_ranked_rows() {
        let page = ResultPage {
            query: "cat".into(),
            directory: "html".into(),
            total_hits: 1,
            hits: vec![Hit { rank: 1, score: 1.0, title: "Cats & Dogs".into(), path: "/c/html/a.html".into() }],
        };
        let mut buf = Vec::new();
        render_html(&page, &mut buf).unwrap();
        let html = String::from_utf8(buf).unwrap();
        assert!(html.contains("<title>Results for query cat in directory html</title>"));
        assert!(html.contains("<p><b><i>1</i>. Cats &amp; Dogs</b><br><span style='margin-left:3em'>/c/html/a.html</span></p>"));
    }
}
