use clap::Parser;
use thiserror::Error;

use crate::config::{Config, normalize_course};

const ACTION_HELP: &str = "choose from
    files       - downloads files/resources
    assignments - lists assignments, downloads attachments
    submissions - downloads submissions of the selected rolls
    urls        - lists urls
    courses     - lists enrolled courses
    whoami      - shows the user's name and exits
Abbreviations such as any one of 'f', 'a', 's', 'u', 'c', 'w' are supported.";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "welearn",
    version,
    about = "A command line client for interacting with WeLearn."
)]
pub struct Cli {
    #[arg(help = ACTION_HELP)]
    pub action: String,

    /// Short names of the courses to work on. The word ALL selects the courses
    /// from the config file.
    pub courses: Vec<String>,

    /// Show verbose warnings/errors
    #[arg(short, long)]
    pub verbose: bool,

    /// Show only due assignments with the 'assignments' action
    #[arg(short = 'd', long = "dueassignments")]
    pub due_assignments: bool,

    /// Add due assignments to Google Calendar with the 'assignments' action
    #[arg(short = 'c', long = "gcalendar")]
    pub gcalendar: bool,

    /// Ignore the specified extensions when downloading, overrides the config
    #[arg(short = 'i', long = "ignoretypes", num_args = 0.., value_name = "EXT")]
    pub ignore_types: Option<Vec<String>>,

    /// Roll numbers whose submissions are downloaded with the 'submissions' action
    #[arg(short = 'r', long = "rolls", num_args = 0.., value_name = "ROLL")]
    pub rolls: Option<Vec<String>>,

    /// Save the downloads to a custom path, overrides the config
    #[arg(short = 'p', long = "pathprefix", value_name = "DIR")]
    pub path_prefix: Option<String>,

    /// Download files even if already downloaded
    #[arg(short = 'f', long = "forcedownload")]
    pub force_download: bool,

    /// Rebuild the course cache, use this after changing the [submissions] section
    #[arg(short = 'u', long = "update-course-cache")]
    pub update_course_cache: bool,

    /// Re-download files which were downloaded earlier but deleted/moved since
    #[arg(short = 'm', long = "missingdownload")]
    pub missing_download: bool,

    /// Number of parallel downloads for the 'files' action
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// Expand downloaded zip archives next to the archive
    #[arg(short = 'x', long = "extract")]
    pub extract: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Files,
    Assignments,
    Submissions,
    Urls,
    Courses,
    Whoami,
}

impl Action {
    const ALL: [Action; 6] = [
        Action::Files,
        Action::Assignments,
        Action::Submissions,
        Action::Urls,
        Action::Courses,
        Action::Whoami,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::Files => "files",
            Action::Assignments => "assignments",
            Action::Submissions => "submissions",
            Action::Urls => "urls",
            Action::Courses => "courses",
            Action::Whoami => "whoami",
        }
    }

    /// Accepts the full name or any prefix of it.
    pub fn from_word(word: &str) -> Option<Self> {
        let word = word.trim().to_ascii_lowercase();
        if word.is_empty() {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|action| action.name().starts_with(&word))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("Invalid action! Use the -h flag for usage.")]
    InvalidAction(String),
    #[error("Can only use --{0} with 'assignments' action! Use the -h flag for usage.")]
    AssignmentsOnly(&'static str),
    #[error("--jobs must be at least 1")]
    NoWorkers,
}

impl Cli {
    pub fn resolve_action(&self) -> Result<Action, CliError> {
        let action = Action::from_word(&self.action)
            .ok_or_else(|| CliError::InvalidAction(self.action.clone()))?;
        if action != Action::Assignments {
            if self.due_assignments {
                return Err(CliError::AssignmentsOnly("dueassignments"));
            }
            if self.gcalendar {
                return Err(CliError::AssignmentsOnly("gcalendar"));
            }
        }
        if self.jobs == Some(0) {
            return Err(CliError::NoWorkers);
        }
        Ok(action)
    }

    /// Course short names to act on. `ALL` expands to the configured list, or to
    /// the `[submissions]` courses for the submissions action.
    pub fn selected_courses(&self, action: Action, config: &Config) -> Vec<String> {
        if self
            .courses
            .iter()
            .any(|course| course.trim().eq_ignore_ascii_case("ALL"))
        {
            return match action {
                Action::Submissions => config
                    .submissions
                    .keys()
                    .filter_map(|course| normalize_course(course))
                    .collect(),
                _ => config.all_courses(),
            };
        }
        self.courses
            .iter()
            .map(|course| course.trim().to_string())
            .filter(|course| !course.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("welearn").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn action_prefixes_resolve() {
        assert_eq!(Action::from_word("f"), Some(Action::Files));
        assert_eq!(Action::from_word("assign"), Some(Action::Assignments));
        assert_eq!(Action::from_word("s"), Some(Action::Submissions));
        assert_eq!(Action::from_word("u"), Some(Action::Urls));
        assert_eq!(Action::from_word("C"), Some(Action::Courses));
        assert_eq!(Action::from_word("whoami"), Some(Action::Whoami));
        assert_eq!(Action::from_word("filesx"), None);
        assert_eq!(Action::from_word(""), None);
    }

    #[test]
    fn parses_flags_and_courses() {
        let cli = parse(&["files", "MA1101", "PH1201", "-v", "-f", "-j", "4", "-x"]);
        assert_eq!(cli.courses, vec!["MA1101", "PH1201"]);
        assert!(cli.verbose && cli.force_download && cli.extract);
        assert_eq!(cli.jobs, Some(4));
        assert_eq!(cli.resolve_action(), Ok(Action::Files));
    }

    #[test]
    fn ignore_types_take_many_values() {
        let cli = parse(&["f", "MA1101", "-i", "mp4", "mkv"]);
        assert_eq!(
            cli.ignore_types,
            Some(vec!["mp4".to_string(), "mkv".to_string()])
        );
        let cli = parse(&["f", "MA1101"]);
        assert_eq!(cli.ignore_types, None);
    }

    #[test]
    fn assignment_flags_require_assignments_action() {
        let cli = parse(&["files", "-d"]);
        assert_eq!(
            cli.resolve_action(),
            Err(CliError::AssignmentsOnly("dueassignments"))
        );
        let cli = parse(&["u", "-c"]);
        assert_eq!(cli.resolve_action(), Err(CliError::AssignmentsOnly("gcalendar")));
        let cli = parse(&["a", "-d", "-c"]);
        assert_eq!(cli.resolve_action(), Ok(Action::Assignments));
    }

    #[test]
    fn invalid_action_is_rejected() {
        let cli = parse(&["download"]);
        assert!(matches!(cli.resolve_action(), Err(CliError::InvalidAction(_))));
    }

    #[test]
    fn all_expands_from_config() {
        let config = Config::parse(
            std::path::Path::new("t.toml"),
            "[courses]\nids = [\"ma1101\"]\n[submissions]\nph1201 = [\"ALL\"]\n",
        )
        .unwrap();
        let cli = parse(&["files", "all"]);
        assert_eq!(cli.selected_courses(Action::Files, &config), vec!["MA1101"]);
        assert_eq!(
            cli.selected_courses(Action::Submissions, &config),
            vec!["PH1201"]
        );
        let cli = parse(&["files", " MA2201 "]);
        assert_eq!(cli.selected_courses(Action::Files, &config), vec!["MA2201"]);
    }

    #[test]
    fn zero_jobs_is_an_error() {
        let cli = parse(&["files", "-j", "0"]);
        assert_eq!(cli.resolve_action(), Err(CliError::NoWorkers));
    }
}
