// Blacklist matcher - decides whether a message contains banned terms.
//
// The term set is shared by every message handler and can change at runtime
// (`/blacklist add`, `/blacklist remove`, `/blacklist reload`). Readers always
// work on an immutable compiled snapshot; writers build a new snapshot and
// swap it in, so a concurrent `classify` sees either the old or the new set.

use super::text_normalizer::{normalize, normalize_term};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlacklistError {
    #[error("Blacklist term must not be empty")]
    EmptyTerm,

    #[error("Failed to read blacklist file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to compile blacklist pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Outcome of classifying one message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Classification {
    pub flagged: bool,
    /// Every term found, longest first.
    pub matches: Vec<String>,
}

impl Classification {
    fn clean() -> Self {
        Self::default()
    }

    /// Human-readable rationale, e.g. `Blacklisted words detected: spam, scam`.
    pub fn explanation(&self) -> String {
        format!("Blacklisted words detected: {}", self.matches.join(", "))
    }
}

/// Immutable term list plus its combined alternation pattern.
struct CompiledBlacklist {
    terms: Vec<String>,
    pattern: Option<Regex>,
}

impl CompiledBlacklist {
    fn compile(terms: &BTreeSet<String>) -> Result<Self, BlacklistError> {
        let mut terms: Vec<String> = terms.iter().cloned().collect();
        // Longest first so the alternation tries the most specific term first.
        terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let pattern = if terms.is_empty() {
            None
        } else {
            let alternation = terms
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&alternation)?)
        };

        Ok(Self { terms, pattern })
    }
}

/// Where the active terms come from. Only touched under the writer lock.
#[derive(Debug, Clone, Default)]
struct TermSources {
    defaults: BTreeSet<String>,
    file: BTreeSet<String>,
    added: BTreeSet<String>,
    removed: BTreeSet<String>,
}

impl TermSources {
    fn effective(&self) -> BTreeSet<String> {
        self.defaults
            .iter()
            .chain(self.file.iter())
            .chain(self.added.iter())
            .filter(|t| !self.removed.contains(*t))
            .cloned()
            .collect()
    }
}

pub struct BlacklistMatcher {
    file_path: Option<PathBuf>,
    sources: Mutex<TermSources>,
    compiled: RwLock<Arc<CompiledBlacklist>>,
}

impl BlacklistMatcher {
    /// Build a matcher from a fixed list of terms, with no backing file.
    pub fn new<I, T>(terms: I) -> Result<Self, BlacklistError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let sources = TermSources {
            defaults: clean_terms(terms),
            ..Default::default()
        };
        Self::from_sources(sources, None)
    }

    /// Build a matcher from built-in defaults plus a reloadable term file.
    ///
    /// A missing file is not an error; the defaults are used on their own.
    pub fn load(defaults: &[&str], path: impl Into<PathBuf>) -> Result<Self, BlacklistError> {
        let path = path.into();
        let sources = TermSources {
            defaults: clean_terms(defaults),
            file: read_term_file(&path)?,
            ..Default::default()
        };
        Self::from_sources(sources, Some(path))
    }

    fn from_sources(
        sources: TermSources,
        file_path: Option<PathBuf>,
    ) -> Result<Self, BlacklistError> {
        let compiled = CompiledBlacklist::compile(&sources.effective())?;
        tracing::info!(terms = compiled.terms.len(), "Blacklist compiled");

        Ok(Self {
            file_path,
            sources: Mutex::new(sources),
            compiled: RwLock::new(Arc::new(compiled)),
        })
    }

    fn snapshot(&self) -> Arc<CompiledBlacklist> {
        let guard = self.compiled.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Check `text` against the current term set.
    ///
    /// An empty term set never flags anything.
    pub fn classify(&self, text: &str) -> Classification {
        let snapshot = self.snapshot();
        let Some(pattern) = snapshot.pattern.as_ref() else {
            return Classification::clean();
        };

        let normalized = normalize(text);
        if !pattern.is_match(&normalized.collapsed) && !pattern.is_match(&normalized.spaced) {
            return Classification::clean();
        }

        let matches: Vec<String> = snapshot
            .terms
            .iter()
            .filter(|term| {
                normalized.collapsed.contains(term.as_str())
                    || normalized.spaced.contains(term.as_str())
            })
            .cloned()
            .collect();

        Classification {
            flagged: !matches.is_empty(),
            matches,
        }
    }

    /// Add a term at runtime. Returns `false` if it was already active.
    pub fn add_term(&self, term: &str) -> Result<bool, BlacklistError> {
        let term = normalize_term(term);
        if term.is_empty() {
            return Err(BlacklistError::EmptyTerm);
        }

        self.update(|sources| {
            let was_active = sources.effective().contains(&term);
            sources.removed.remove(&term);
            sources.added.insert(term.clone());
            !was_active
        })
    }

    /// Remove a term at runtime. Returns `false` if it was not active.
    pub fn remove_term(&self, term: &str) -> Result<bool, BlacklistError> {
        let term = normalize_term(term);
        if term.is_empty() {
            return Err(BlacklistError::EmptyTerm);
        }

        self.update(|sources| {
            let was_active = sources.effective().contains(&term);
            sources.added.remove(&term);
            sources.removed.insert(term.clone());
            was_active
        })
    }

    /// Re-read the term file. Runtime additions and removals are kept.
    /// Returns the number of active terms afterwards.
    pub fn reload(&self) -> Result<usize, BlacklistError> {
        let file_terms = match &self.file_path {
            Some(path) => read_term_file(path)?,
            None => BTreeSet::new(),
        };

        self.update(|sources| {
            sources.file = file_terms;
        })?;
        Ok(self.term_count())
    }

    pub fn term_count(&self) -> usize {
        self.snapshot().terms.len()
    }

    /// Apply `change` under the writer lock, recompile, then swap the snapshot.
    /// If compilation fails the sources are left untouched.
    fn update<R>(&self, change: impl FnOnce(&mut TermSources) -> R) -> Result<R, BlacklistError> {
        let mut sources = self.sources.lock().unwrap_or_else(|e| e.into_inner());

        let mut next = sources.clone();
        let result = change(&mut next);
        let compiled = CompiledBlacklist::compile(&next.effective())?;

        *sources = next;
        let mut slot = self.compiled.write().unwrap_or_else(|e| e.into_inner());
        *slot = Arc::new(compiled);
        Ok(result)
    }
}

fn clean_terms<I, T>(terms: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    terms
        .into_iter()
        .map(|t| normalize_term(t.as_ref()))
        .filter(|t| !t.is_empty())
        .collect()
}

/// One term per line; blank lines and `#` comments are skipped.
fn read_term_file(path: &Path) -> Result<BTreeSet<String>, BlacklistError> {
    if !path.exists() {
        tracing::info!(
            path = %path.display(),
            "No blacklist file found, using built-in terms only"
        );
        return Ok(BTreeSet::new());
    }

    let contents = std::fs::read_to_string(path).map_err(|source| BlacklistError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let terms = clean_terms(
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#')),
    );
    tracing::info!(path = %path.display(), terms = terms.len(), "Loaded blacklist file");
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_blacklist_never_flags() {
        let matcher = BlacklistMatcher::new(Vec::<String>::new()).unwrap();
        for text in ["", "spam", "5p4m", "anything at all", "!!!"] {
            let result = matcher.classify(text);
            assert!(!result.flagged);
            assert!(result.matches.is_empty());
        }
    }

    #[test]
    fn test_leet_variants_are_flagged() {
        let matcher = BlacklistMatcher::new(["spam"]).unwrap();
        for text in ["spam", "SPAM", "5p4m", "$pam", "sp@m", "s p a m", "s.p.4.m please"] {
            let result = matcher.classify(text);
            assert!(result.flagged, "{text:?} should be flagged");
            assert_eq!(result.matches, vec!["spam".to_string()]);
        }
        assert!(!matcher.classify("hello there").flagged);
    }

    #[test]
    fn test_collects_every_match_longest_first() {
        let matcher = BlacklistMatcher::new(["scam", "free nitro", "spam"]).unwrap();
        let result = matcher.classify("FR33 N1TR0 spam and scam");
        assert!(result.flagged);
        assert_eq!(result.matches, vec!["free nitro", "scam", "spam"]);
        assert_eq!(
            result.explanation(),
            "Blacklisted words detected: free nitro, scam, spam"
        );
    }

    #[test]
    fn test_phrase_term_needs_spaced_form() {
        let matcher = BlacklistMatcher::new(["free nitro"]).unwrap();
        assert!(matcher.classify("get   free\tnitro now").flagged);
        assert!(!matcher.classify("freely nitrogen").flagged);
    }

    #[test]
    fn test_terms_with_leet_are_stored_normalized() {
        let matcher = BlacklistMatcher::new(["H4X"]).unwrap();
        assert!(matcher.classify("hax").flagged);
        assert!(matcher.classify("h4x").flagged);
    }

    #[test]
    fn test_runtime_add_and_remove_are_visible_immediately() {
        let matcher = BlacklistMatcher::new(["spam"]).unwrap();
        assert!(!matcher.classify("scam").flagged);

        assert!(matcher.add_term("Scam").unwrap());
        assert!(!matcher.add_term("scam").unwrap());
        assert!(matcher.classify("5c4m").flagged);
        assert_eq!(matcher.term_count(), 2);

        assert!(matcher.remove_term("spam").unwrap());
        assert!(!matcher.remove_term("spam").unwrap());
        assert!(!matcher.classify("spam").flagged);
        assert_eq!(matcher.term_count(), 1);

        assert!(matches!(
            matcher.add_term("   "),
            Err(BlacklistError::EmptyTerm)
        ));
    }

    #[test]
    fn test_removing_last_term_fails_open() {
        let matcher = BlacklistMatcher::new(["spam"]).unwrap();
        matcher.remove_term("spam").unwrap();
        assert!(!matcher.classify("spam spam spam").flagged);
    }

    #[test]
    fn test_load_and_reload_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# comment line").unwrap();
        writeln!(file, "badword").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  Other Term  ").unwrap();
        file.flush().unwrap();

        let matcher = BlacklistMatcher::load(&["builtin"], file.path()).unwrap();
        assert_eq!(matcher.term_count(), 3);
        assert!(matcher.classify("b a d w o r d").flagged);
        assert!(matcher.classify("other term").flagged);
        assert!(!matcher.classify("comment line").flagged);

        matcher.add_term("runtime").unwrap();

        std::fs::write(file.path(), "replacement\n").unwrap();
        assert_eq!(matcher.reload().unwrap(), 3);
        assert!(!matcher.classify("badword").flagged);
        assert!(matcher.classify("replacement").flagged);
        assert!(matcher.classify("runtime").flagged);
        assert!(matcher.classify("builtin").flagged);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let matcher = BlacklistMatcher::load(&["spam"], dir.path().join("absent.txt")).unwrap();
        assert_eq!(matcher.term_count(), 1);
        assert_eq!(matcher.reload().unwrap(), 1);
    }

    #[test]
    fn test_concurrent_readers_see_complete_sets() {
        let matcher = Arc::new(BlacklistMatcher::new(["alpha"]).unwrap());

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let matcher = Arc::clone(&matcher);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let result = matcher.classify("alpha beta");
                        let only_alpha = vec!["alpha".to_string()];
                        let both = vec!["alpha".to_string(), "beta".to_string()];
                        assert!(result.matches == only_alpha || result.matches == both);
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            matcher.add_term("beta").unwrap();
            matcher.remove_term("beta").unwrap();
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
