use std::collections::BTreeSet;

use super::engine::{SyncOutcome, SyncStatus};

/// Report lines keyed by short path, first occurrence kept.
#[derive(Default)]
struct Entries {
    seen: BTreeSet<String>,
    lines: Vec<String>,
}

impl Entries {
    fn add(&mut self, short_path: &str, line: String) {
        if self.seen.insert(short_path.to_string()) {
            self.lines.push(line);
        }
    }
}

struct Group {
    singular: &'static str,
    plural: &'static str,
    header: &'static str,
    entries: Vec<String>,
}

/// Report printed after a run. Existing files are silent and downloads were
/// already printed inline, so they only decide where blank lines go.
pub fn render(outcomes: &[SyncOutcome], verbose: bool) -> String {
    let mut ignored = Entries::default();
    let mut missing = Entries::default();
    let mut failed = Entries::default();
    let mut downloaded = 0usize;
    for outcome in outcomes {
        let path = outcome.short_path.as_str();
        match &outcome.status {
            SyncStatus::Exists => {}
            SyncStatus::Downloaded => downloaded += 1,
            SyncStatus::Ignored => ignored.add(path, path.to_string()),
            SyncStatus::Missing => missing.add(path, path.to_string()),
            SyncStatus::Failed(reason) => failed.add(path, format!("{path}: {reason}")),
        }
    }

    let groups = [
        Group {
            singular: "1 file has been ignored",
            plural: "files have been ignored",
            header: "The following files have been ignored.",
            entries: ignored.lines,
        },
        Group {
            singular: "1 file is missing",
            plural: "files are missing",
            header: "The following files are missing, use --missingdownload to download them.",
            entries: missing.lines,
        },
        Group {
            singular: "1 file failed to download",
            plural: "files failed to download",
            header: "The following files failed to download.",
            entries: failed.lines,
        },
    ];

    let mut lines: Vec<String> = Vec::new();
    let mut printed_before = downloaded > 0;
    for group in groups {
        if group.entries.is_empty() {
            continue;
        }
        if printed_before {
            lines.push(String::new());
        }
        if verbose {
            lines.push(group.header.to_string());
            lines.extend(group.entries.iter().map(|entry| format!("    {entry}")));
        } else if group.entries.len() == 1 {
            lines.push(format!("{}, use --verbose for more info", group.singular));
        } else {
            lines.push(format!(
                "{} {}, use --verbose for more info",
                group.entries.len(),
                group.plural
            ));
        }
        printed_before = true;
    }

    let mut report = lines.join("\n");
    if !report.is_empty() {
        report.push('\n');
    }
    report
}

pub fn print(outcomes: &[SyncOutcome], verbose: bool) {
    print!("{}", render(outcomes, verbose));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: SyncStatus, path: &str) -> SyncOutcome {
        SyncOutcome {
            status,
            short_path: path.to_string(),
        }
    }

    #[test]
    fn quiet_when_everything_exists() {
        let outcomes = vec![outcome(SyncStatus::Exists, "C/a.pdf")];
        assert_eq!(render(&outcomes, false), "");
        assert_eq!(render(&[], true), "");
    }

    #[test]
    fn summary_counts_use_singular_and_plural() {
        let outcomes = vec![
            outcome(SyncStatus::Ignored, "C/a.mp4"),
            outcome(SyncStatus::Missing, "C/b.pdf"),
            outcome(SyncStatus::Missing, "C/c.pdf"),
        ];
        assert_eq!(
            render(&outcomes, false),
            "1 file has been ignored, use --verbose for more info\n\
             \n\
             2 files are missing, use --verbose for more info\n"
        );
    }

    #[test]
    fn downloads_separate_the_first_group() {
        let outcomes = vec![
            outcome(SyncStatus::Downloaded, "C/new.pdf"),
            outcome(SyncStatus::Missing, "C/b.pdf"),
        ];
        assert_eq!(
            render(&outcomes, false),
            "\n1 file is missing, use --verbose for more info\n"
        );
    }

    #[test]
    fn verbose_lists_each_path() {
        let outcomes = vec![
            outcome(SyncStatus::Missing, "C/b.pdf"),
            outcome(SyncStatus::Ignored, "C/a.mp4"),
            outcome(SyncStatus::Failed("request failed".into()), "C/x.zip"),
            outcome(SyncStatus::Ignored, "C/Week 1/z.mp4"),
        ];
        assert_eq!(
            render(&outcomes, true),
            "The following files have been ignored.\n    C/a.mp4\n    C/Week 1/z.mp4\n\
             \n\
             The following files are missing, use --missingdownload to download them.\n    C/b.pdf\n\
             \n\
             The following files failed to download.\n    C/x.zip: request failed\n"
        );
    }

    #[test]
    fn repeated_paths_are_reported_once() {
        let outcomes = vec![
            outcome(SyncStatus::Missing, "C/slides.pdf"),
            outcome(SyncStatus::Missing, "C/slides.pdf"),
            outcome(SyncStatus::Failed("first".into()), "C/x.zip"),
            outcome(SyncStatus::Failed("second".into()), "C/x.zip"),
            outcome(SyncStatus::Missing, "C/notes.pdf"),
        ];
        assert_eq!(
            render(&outcomes, true),
            "The following files are missing, use --missingdownload to download them.\n    \
             C/slides.pdf\n    C/notes.pdf\n\
             \n\
             The following files failed to download.\n    C/x.zip: first\n"
        );
        assert_eq!(
            render(&outcomes, false),
            "2 files are missing, use --verbose for more info\n\
             \n\
             1 file failed to download, use --verbose for more info\n"
        );
    }

    #[test]
    fn failures_are_counted() {
        let outcomes = vec![
            outcome(SyncStatus::Failed("a".into()), "C/1"),
            outcome(SyncStatus::Failed("b".into()), "C/2"),
            outcome(SyncStatus::Failed("c".into()), "C/3"),
        ];
        assert_eq!(
            render(&outcomes, false),
            "3 files failed to download, use --verbose for more info\n"
        );
    }
}
