use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

fn collect_files(dir: &Path, ext: &str, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, ext, out);
        } else if path.extension().and_then(|s| s.to_str()) == Some(ext) {
            out.push(path);
        }
    }
}

fn line_number(content: &str, byte_idx: usize) -> usize {
    content[..byte_idx].bytes().filter(|b| *b == b'\n').count() + 1
}

/// First string literal passed to the call starting at `call_idx`, plain or raw.
fn sql_literal_at(content: &str, call_idx: usize) -> Option<String> {
    let open = call_idx + content[call_idx..].find('(')? + 1;
    let rest = content[open..].trim_start();

    if let Some(raw) = rest.strip_prefix('r') {
        let hashes = raw.chars().take_while(|c| *c == '#').count();
        let body = raw[hashes..].strip_prefix('"')?;
        let terminator = format!("\"{}", "#".repeat(hashes));
        let end = body.find(&terminator)?;
        return Some(body[..end].to_string());
    }

    let body = rest.strip_prefix('"')?;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(body[..i].to_string()),
            _ => {}
        }
    }
    None
}

fn query_literals(content: &str) -> Vec<(usize, String)> {
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(rel) = content[pos..].find("sqlx::query") {
        let idx = pos + rel;
        if let Some(sql) = sql_literal_at(content, idx) {
            found.push((line_number(content, idx), sql));
        }
        pos = idx + "sqlx::query".len();
    }
    found
}

fn repository_queries() -> Vec<(String, usize, String)> {
    let mut files = Vec::new();
    collect_files(&Path::new(env!("CARGO_MANIFEST_DIR")).join("src"), "rs", &mut files);

    let mut queries = Vec::new();
    for file in files {
        let Ok(content) = fs::read_to_string(&file) else {
            continue;
        };
        for (line, sql) in query_literals(&content) {
            queries.push((file.display().to_string(), line, sql));
        }
    }
    queries
}

fn migrated_tables() -> BTreeSet<String> {
    let mut files = Vec::new();
    collect_files(&Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"), "sql", &mut files);

    let mut tables = BTreeSet::new();
    for file in files {
        let content = fs::read_to_string(&file).unwrap().to_lowercase();
        let words: Vec<&str> = content.split_whitespace().collect();
        for (i, window) in words.windows(2).enumerate() {
            if window == ["create", "table"] {
                let name = words[i + 2..]
                    .iter()
                    .find(|w| !matches!(**w, "if" | "not" | "exists"))
                    .unwrap();
                tables.insert(name.trim_matches('(').to_string());
            }
        }
    }
    tables
}

fn referenced_tables(sql: &str) -> Vec<String> {
    let lower = sql.to_lowercase().replace(['(', ')', ','], " ");
    let words: Vec<&str> = lower.split_whitespace().collect();
    words
        .windows(2)
        .filter(|w| matches!(w[0], "from" | "into" | "update" | "join") && w[1] != "set")
        .map(|w| w[1].to_string())
        .collect()
}

fn placeholders(sql: &str) -> BTreeSet<usize> {
    let mut found = BTreeSet::new();
    let bytes = sql.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b != b'$' {
            continue;
        }
        let digits: String = sql[i + 1..].chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(n) = digits.parse() {
            found.insert(n);
        }
    }
    found
}

#[test]
fn queries_use_postgres_placeholders() {
    let violations: Vec<String> = repository_queries()
        .into_iter()
        .filter(|(_, _, sql)| sql.contains('?'))
        .map(|(file, line, _)| format!("{}:{} uses '?' instead of $N", file, line))
        .collect();

    assert!(violations.is_empty(), "SQLite placeholders found:\n{}", violations.join("\n"));
}

#[test]
fn placeholders_are_numbered_without_gaps() {
    let mut violations = Vec::new();
    for (file, line, sql) in repository_queries() {
        let used = placeholders(&sql);
        let expected: BTreeSet<usize> = (1..=used.len()).collect();
        if used != expected {
            violations.push(format!("{}:{} uses placeholders {:?}", file, line, used));
        }
    }

    assert!(violations.is_empty(), "Gaps in placeholder numbering:\n{}", violations.join("\n"));
}

#[test]
fn queries_only_touch_migrated_tables() {
    let tables = migrated_tables();
    assert!(tables.contains("inbounds"), "migrations define: {:?}", tables);

    let mut violations = Vec::new();
    for (file, line, sql) in repository_queries() {
        for table in referenced_tables(&sql) {
            if !tables.contains(&table) {
                violations.push(format!("{}:{} references unknown table {}", file, line, table));
            }
        }
    }

    assert!(violations.is_empty(), "Queries against unmigrated tables:\n{}", violations.join("\n"));
}
