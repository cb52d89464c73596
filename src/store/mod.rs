// src/store/mod.rs

//! Persistence over an external key-value store.
//!
//! The store owns the entire key space: package documents, the inverted
//! index, the importer graph, crawl queues, operator blocks, and the
//! popularity ranking. Every multi-key mutation is applied as one atomic
//! batch, so readers never see a package listed under a term whose document
//! is missing, and importer edges move in lock-step with the imports that
//! produce them.

pub mod kv;
pub mod redis;

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::builder::path::is_standard_path;
use crate::error::{Error, Result};
use crate::index;
use crate::models::{Package, PackageDoc};

pub use kv::{Kv, MemoryKv, WriteOp};
pub use redis::RedisKv;

/// Key layout. All backends share this logical key space.
mod keys {
    pub const IDS: &str = "ids";
    pub const NEXT_ID: &str = "nextId";
    pub const BLOCK: &str = "block";
    pub const POPULAR: &str = "popular";
    pub const POPULAR_EPOCH: &str = "popular:0";
    pub const NEW_CRAWL: &str = "newCrawl";
    pub const BAD_CRAWL: &str = "badCrawl";
    pub const CRAWL: &str = "crawl";

    pub fn package(id: i64) -> String {
        format!("pkg:{id}")
    }

    pub fn index(term: &str) -> String {
        format!("index:{term}")
    }

    pub fn importers(id: i64) -> String {
        format!("importers:{id}")
    }

    pub fn meta(name: &str) -> String {
        format!("meta:{name}")
    }
}

/// Time a popularity increment takes to lose half its weight.
pub const POPULAR_HALF_LIFE_SECS: i64 = 14 * 24 * 60 * 60;

/// Once scaled time passes this ceiling, scores are renormalized and the
/// reference instant advanced.
const POPULAR_RESCALE_CEILING: f64 = 32.0;

/// Alias the maintenance task passes to [`Store::get`] for "the record due
/// next".
pub const CURSOR_PATH: &str = "-";

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).unwrap()
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(epoch)
}

/// Parsed `pkg:<id>` hash.
struct PkgRow {
    fields: HashMap<String, String>,
}

impl PkgRow {
    fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    fn doc(&self) -> Result<PackageDoc> {
        Ok(serde_json::from_str(self.field("doc"))?)
    }

    fn terms(&self) -> BTreeSet<String> {
        self.field("terms")
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    fn imports(&self) -> Vec<String> {
        self.doc().map(|d| d.imports).unwrap_or_default()
    }

    fn score(&self) -> f64 {
        self.field("score").parse().unwrap_or(0.0)
    }

    fn next_crawl(&self) -> DateTime<Utc> {
        from_unix(self.field("nextCrawl").parse().unwrap_or(0))
    }

    fn package(&self) -> Package {
        Package::new(self.field("path"), self.field("synopsis"))
    }
}

/// The persistence layer. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    kv: Arc<dyn Kv>,
}

impl Store {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self { kv }
    }

    /// In-process store, used by tests and `--store memory`.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryKv::new()))
    }

    async fn id_of(&self, path: &str) -> Result<Option<i64>> {
        Ok(self
            .kv
            .hash_get(keys::IDS, path)
            .await?
            .and_then(|s| s.parse().ok()))
    }

    /// Id for `path`, allocating one if the path has never been seen.
    /// Ids are stable across delete and re-put.
    async fn ensure_id(&self, path: &str, ops: &mut Vec<WriteOp>) -> Result<i64> {
        if let Some(id) = self.id_of(path).await? {
            return Ok(id);
        }
        let id = self.kv.incr(keys::NEXT_ID).await?;
        ops.push(WriteOp::HashSet {
            key: keys::IDS.to_string(),
            field: path.to_string(),
            value: id.to_string(),
        });
        Ok(id)
    }

    async fn row(&self, id: i64) -> Result<Option<PkgRow>> {
        let fields = self.kv.hash_get_all(&keys::package(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(PkgRow {
            fields: fields.into_iter().collect(),
        }))
    }

    async fn row_of(&self, path: &str) -> Result<Option<(i64, PkgRow)>> {
        let Some(id) = self.id_of(path).await? else {
            return Ok(None);
        };
        Ok(self.row(id).await?.map(|row| (id, row)))
    }

    /// True if a package document is stored for `path`.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.row_of(path).await?.is_some())
    }

    /// All `(path, id)` pairs ever allocated, including paths whose document
    /// has been deleted.
    async fn all_ids(&self) -> Result<Vec<(String, i64)>> {
        Ok(self
            .kv
            .hash_get_all(keys::IDS)
            .await?
            .into_iter()
            .filter_map(|(path, id)| id.parse().ok().map(|id| (path, id)))
            .collect())
    }

    /// Known packages strictly below `path`, alphabetized.
    async fn subdirectories(&self, path: &str) -> Result<Vec<Package>> {
        let prefix = format!("{path}/");
        let mut out = Vec::new();
        for (candidate, id) in self.all_ids().await? {
            if !candidate.starts_with(&prefix) {
                continue;
            }
            if let Some(row) = self.row(id).await? {
                out.push(row.package());
            }
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    /// Store a package document atomically, re-deriving its index terms and
    /// diffing terms and imports against the previous revision.
    ///
    /// A zero `next_crawl` preserves the existing schedule when the package
    /// is already known.
    pub async fn put(&self, pdoc: &PackageDoc, next_crawl: DateTime<Utc>) -> Result<()> {
        if pdoc.import_path.is_empty() {
            return Err(Error::store("put: empty import path"));
        }

        let mut ops = Vec::new();
        let id = self.ensure_id(&pdoc.import_path, &mut ops).await?;
        let old = self.row(id).await?;

        let (old_terms, old_imports, old_next_crawl) = match &old {
            Some(row) => (row.terms(), row.imports(), row.next_crawl()),
            None => (BTreeSet::new(), Vec::new(), epoch()),
        };

        let next_crawl = if next_crawl == epoch() && old.is_some() {
            old_next_crawl
        } else {
            next_crawl
        };

        let score = index::document_score(pdoc);
        let new_terms: BTreeSet<String> = index::document_terms(pdoc, score).into_iter().collect();

        let key = keys::package(id);
        for (field, value) in [
            ("path", pdoc.import_path.clone()),
            ("doc", serde_json::to_string(pdoc)?),
            (
                "terms",
                new_terms.iter().cloned().collect::<Vec<_>>().join(" "),
            ),
            ("score", score.to_string()),
            ("synopsis", pdoc.synopsis.clone()),
            ("etag", pdoc.etag.clone()),
            ("updated", pdoc.updated.timestamp().to_string()),
            ("nextCrawl", next_crawl.timestamp().to_string()),
        ] {
            ops.push(WriteOp::HashSet {
                key: key.clone(),
                field: field.to_string(),
                value,
            });
        }
        ops.push(WriteOp::ZAdd {
            key: keys::CRAWL.to_string(),
            member: id.to_string(),
            score: next_crawl.timestamp() as f64,
        });

        for term in old_terms.difference(&new_terms) {
            ops.push(WriteOp::ZRem {
                key: keys::index(term),
                member: id.to_string(),
            });
        }
        for term in &new_terms {
            ops.push(WriteOp::ZAdd {
                key: keys::index(term),
                member: id.to_string(),
                score,
            });
        }

        let old_imports: BTreeSet<String> = old_imports.into_iter().collect();
        let new_imports: BTreeSet<String> = pdoc.imports.iter().cloned().collect();
        for import in old_imports.difference(&new_imports) {
            if let Some(import_id) = self.id_of(import).await? {
                ops.push(WriteOp::SetRem {
                    key: keys::importers(import_id),
                    member: id.to_string(),
                });
            }
        }
        for import in new_imports.difference(&old_imports) {
            let import_id = self.ensure_id(import, &mut ops).await?;
            ops.push(WriteOp::SetAdd {
                key: keys::importers(import_id),
                member: id.to_string(),
            });
        }

        // The path is no longer waiting for a first crawl.
        ops.push(WriteOp::SetRem {
            key: keys::NEW_CRAWL.to_string(),
            member: pdoc.import_path.clone(),
        });

        self.kv.apply(ops).await
    }

    /// Fetch the document stored for `path`, the known packages below it,
    /// and its crawl schedule. The cursor path `"-"` resolves to the record
    /// due next.
    pub async fn get(
        &self,
        path: &str,
    ) -> Result<(Option<PackageDoc>, Vec<Package>, DateTime<Utc>)> {
        if path == CURSOR_PATH {
            let due = self.kv.zset_range(keys::CRAWL, 0, 0).await?;
            let Some((id, _)) = due.first() else {
                return Ok((None, Vec::new(), epoch()));
            };
            let Some(row) = self.row(id.parse().unwrap_or(0)).await? else {
                return Ok((None, Vec::new(), epoch()));
            };
            let subdirs = self.subdirectories(row.field("path")).await?;
            return Ok((Some(row.doc()?), subdirs, row.next_crawl()));
        }

        let subdirs = self.subdirectories(path).await?;
        match self.row_of(path).await? {
            Some((_, row)) => Ok((Some(row.doc()?), subdirs, row.next_crawl())),
            None => Ok((None, subdirs, epoch())),
        }
    }

    /// Remove the document for `path` together with its index postings,
    /// outgoing importer edges, popularity entry, and queue memberships.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let mut ops = vec![
            WriteOp::SetRem {
                key: keys::NEW_CRAWL.to_string(),
                member: path.to_string(),
            },
            WriteOp::SetRem {
                key: keys::BAD_CRAWL.to_string(),
                member: path.to_string(),
            },
        ];
        if let Some((id, row)) = self.row_of(path).await? {
            for term in row.terms() {
                ops.push(WriteOp::ZRem {
                    key: keys::index(&term),
                    member: id.to_string(),
                });
            }
            for import in row.imports() {
                if let Some(import_id) = self.id_of(&import).await? {
                    ops.push(WriteOp::SetRem {
                        key: keys::importers(import_id),
                        member: id.to_string(),
                    });
                }
            }
            ops.push(WriteOp::ZRem {
                key: keys::CRAWL.to_string(),
                member: id.to_string(),
            });
            ops.push(WriteOp::ZRem {
                key: keys::POPULAR.to_string(),
                member: id.to_string(),
            });
            ops.push(WriteOp::Del {
                key: keys::package(id),
            });
        }
        self.kv.apply(ops).await
    }

    /// Batched `(path, synopsis)` projection preserving caller order.
    /// Unknown paths appear with an empty synopsis.
    pub async fn packages(&self, paths: &[String]) -> Result<Vec<Package>> {
        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let package = match self.row_of(path).await? {
                Some((_, row)) => row.package(),
                None => Package::new(path.clone(), ""),
            };
            out.push(package);
        }
        Ok(out)
    }

    /// Packages whose imports contain `path`, alphabetized.
    pub async fn importers(&self, path: &str) -> Result<Vec<Package>> {
        let Some(id) = self.id_of(path).await? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for importer in self.kv.set_members(&keys::importers(id)).await? {
            let Ok(importer_id) = importer.parse::<i64>() else {
                continue;
            };
            if let Some(row) = self.row(importer_id).await? {
                out.push(row.package());
            }
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    /// Cardinality of the importer set for `path`.
    pub async fn importer_count(&self, path: &str) -> Result<u64> {
        let Some(id) = self.id_of(path).await? else {
            return Ok(0);
        };
        self.kv.set_card(&keys::importers(id)).await
    }

    /// Breadth-first walk of the importer relation rooted at `path`.
    /// Returns the visited packages and `(importer, imported)` index pairs.
    pub async fn import_graph(
        &self,
        path: &str,
        hide_std: bool,
    ) -> Result<(Vec<Package>, Vec<(usize, usize)>)> {
        let Some((_, row)) = self.row_of(path).await? else {
            return Err(Error::not_found(format!("no package for {path}")));
        };

        let mut nodes = vec![row.package()];
        let mut seen: HashMap<String, usize> = HashMap::from([(path.to_string(), 0)]);
        let mut edges = Vec::new();
        let mut queue = VecDeque::from([path.to_string()]);

        while let Some(current) = queue.pop_front() {
            let current_idx = seen[&current];
            for importer in self.importers(&current).await? {
                if hide_std && is_standard_path(&importer.path) {
                    continue;
                }
                let idx = match seen.get(&importer.path) {
                    Some(&idx) => idx,
                    None => {
                        let idx = nodes.len();
                        seen.insert(importer.path.clone(), idx);
                        queue.push_back(importer.path.clone());
                        nodes.push(importer);
                        idx
                    }
                };
                if idx != current_idx {
                    edges.push((idx, current_idx));
                }
            }
        }
        Ok((nodes, edges))
    }

    /// Evaluate a free-text query: intersect term postings, then rank by
    /// importer count, popularity, and document score.
    pub async fn query(&self, q: &str) -> Result<Vec<Package>> {
        let mut postings: Vec<HashMap<i64, f64>> = Vec::new();

        for token in split_query(q) {
            if token.contains('.') || token.contains('/') {
                // Path-like tokens query the import and project namespaces
                // literally.
                let mut merged: HashMap<i64, f64> = HashMap::new();
                for namespace in ["import", "project"] {
                    let key = keys::index(&format!("{namespace}:{token}"));
                    for (member, score) in self.kv.zset_range(&key, 0, -1).await? {
                        if let Ok(id) = member.parse() {
                            *merged.entry(id).or_insert(0.0) += score;
                        }
                    }
                }
                postings.push(merged);
            } else {
                // Stop words vanish; the rest normalize exactly as they did
                // at index time.
                let Some(term) = index::parse_query(&token).into_iter().next() else {
                    continue;
                };
                let key = keys::index(&term);
                let mut set = HashMap::new();
                for (member, score) in self.kv.zset_range(&key, 0, -1).await? {
                    if let Ok(id) = member.parse() {
                        set.insert(id, score);
                    }
                }
                postings.push(set);
            }
        }

        let Some((first, rest)) = postings.split_first() else {
            return Ok(Vec::new());
        };
        let mut combined: HashMap<i64, f64> = first.clone();
        for set in rest {
            combined = combined
                .into_iter()
                .filter_map(|(id, score)| set.get(&id).map(|s| (id, score + s)))
                .collect();
        }

        let mut ranked = Vec::new();
        for (id, score) in combined {
            let Some(row) = self.row(id).await? else {
                continue;
            };
            let doc = row.doc()?;
            let import_count = self.kv.set_card(&keys::importers(id)).await?;
            let popularity = self
                .kv
                .zset_score(keys::POPULAR, &id.to_string())
                .await?
                .unwrap_or(0.0);
            ranked.push((
                import_count,
                popularity,
                score,
                Package {
                    path: doc.import_path,
                    synopsis: doc.synopsis,
                    import_count,
                    stars: doc.stars,
                    fork: doc.fork,
                },
            ));
        }
        ranked.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.3.path.cmp(&b.3.path))
        });
        Ok(ranked.into_iter().map(|(_, _, _, p)| p).collect())
    }

    /// Block `prefix` and drop every stored package at or below it.
    pub async fn block(&self, prefix: &str) -> Result<()> {
        self.kv
            .apply(vec![WriteOp::SetAdd {
                key: keys::BLOCK.to_string(),
                member: prefix.to_string(),
            }])
            .await?;
        let nested = format!("{prefix}/");
        for (path, _) in self.all_ids().await? {
            if path == prefix || path.starts_with(&nested) {
                self.delete(&path).await?;
            }
        }
        Ok(())
    }

    /// True if `path` or any ancestor prefix of it is blocked.
    pub async fn is_blocked(&self, path: &str) -> Result<bool> {
        let mut end = 0;
        let bytes = path.as_bytes();
        loop {
            let next = bytes[end..]
                .iter()
                .position(|&b| b == b'/')
                .map(|i| end + i);
            let prefix = match next {
                Some(i) => &path[..i],
                None => path,
            };
            if self.kv.set_contains(keys::BLOCK, prefix).await? {
                return Ok(true);
            }
            match next {
                Some(i) => end = i + 1,
                None => return Ok(false),
            }
        }
    }

    fn scaled_time(t0_secs: i64, at: DateTime<Utc>) -> f64 {
        (at.timestamp() - t0_secs) as f64 / POPULAR_HALF_LIFE_SECS as f64
    }

    /// Add `base` weight to the popularity of `path` as of instant `at`.
    ///
    /// Scores live in a scaled coordinate system anchored at the stored
    /// reference instant: an event at time `t` is worth `base * 2^scaled(t)`,
    /// which keeps old entries summable without rewriting them. When scaled
    /// time exceeds the ceiling, every entry is multiplied by `2^-K` and the
    /// anchor advanced by `K` half-lives.
    pub async fn increment_popular_score_at(
        &self,
        path: &str,
        base: f64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut ops = Vec::new();
        let id = self.ensure_id(path, &mut ops).await?;

        let t0 = match self.kv.string_get(keys::POPULAR_EPOCH).await? {
            Some(s) => s.parse::<i64>().unwrap_or(0),
            None => {
                let t0 = at.timestamp();
                ops.push(WriteOp::StringSet {
                    key: keys::POPULAR_EPOCH.to_string(),
                    value: t0.to_string(),
                });
                t0
            }
        };

        let scaled = Self::scaled_time(t0, at);
        ops.push(WriteOp::ZIncr {
            key: keys::POPULAR.to_string(),
            member: id.to_string(),
            delta: base * scaled.exp2(),
        });
        self.kv.apply(ops).await?;

        if scaled > POPULAR_RESCALE_CEILING {
            self.renormalize_popular(t0, scaled).await?;
        }
        Ok(())
    }

    async fn renormalize_popular(&self, t0: i64, scaled: f64) -> Result<()> {
        let k = scaled.floor();
        let factor = (-k).exp2();
        let mut ops = vec![WriteOp::StringSet {
            key: keys::POPULAR_EPOCH.to_string(),
            value: (t0 + (k as i64) * POPULAR_HALF_LIFE_SECS).to_string(),
        }];
        for (member, score) in self.kv.zset_range(keys::POPULAR, 0, -1).await? {
            ops.push(WriteOp::ZAdd {
                key: keys::POPULAR.to_string(),
                member,
                score: score * factor,
            });
        }
        self.kv.apply(ops).await
    }

    /// Record one qualifying page view for `path`.
    pub async fn increment_popular_score(&self, path: &str) -> Result<()> {
        self.increment_popular_score_at(path, 1.0, Utc::now()).await
    }

    /// Top `n` packages by popularity.
    pub async fn popular(&self, n: usize) -> Result<Vec<Package>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for (member, _) in self
            .kv
            .zset_rev_range(keys::POPULAR, 0, n as isize - 1)
            .await?
        {
            let Ok(id) = member.parse::<i64>() else {
                continue;
            };
            if let Some(row) = self.row(id).await? {
                out.push(row.package());
            }
        }
        Ok(out)
    }

    /// Pull the crawl schedule of every package in the project rooted at
    /// `root` forward to `t` (never backward).
    pub async fn set_next_crawl(&self, root: &str, t: DateTime<Utc>) -> Result<()> {
        let nested = format!("{root}/");
        let mut ops = Vec::new();
        for (path, id) in self.all_ids().await? {
            if path != root && !path.starts_with(&nested) {
                continue;
            }
            let Some(row) = self.row(id).await? else {
                continue;
            };
            if row.doc()?.project_root != root && path != root {
                continue;
            }
            let current = row.next_crawl();
            let next = t.min(current);
            if next == current {
                continue;
            }
            ops.push(WriteOp::HashSet {
                key: keys::package(id),
                field: "nextCrawl".to_string(),
                value: next.timestamp().to_string(),
            });
            ops.push(WriteOp::ZAdd {
                key: keys::CRAWL.to_string(),
                member: id.to_string(),
                score: next.timestamp() as f64,
            });
        }
        self.kv.apply(ops).await
    }

    /// Reset the crawl schedule of every package under `root` whose stored
    /// etag matches, regardless of direction. Used by the scheduler to push
    /// untouched packages past their freshness window.
    pub async fn touch_next_crawl(&self, root: &str, etag: &str, t: DateTime<Utc>) -> Result<()> {
        let nested = format!("{root}/");
        let mut ops = Vec::new();
        for (path, id) in self.all_ids().await? {
            if path != root && !path.starts_with(&nested) {
                continue;
            }
            let Some(row) = self.row(id).await? else {
                continue;
            };
            if row.field("etag") != etag {
                continue;
            }
            ops.push(WriteOp::HashSet {
                key: keys::package(id),
                field: "nextCrawl".to_string(),
                value: t.timestamp().to_string(),
            });
            ops.push(WriteOp::ZAdd {
                key: keys::CRAWL.to_string(),
                member: id.to_string(),
                score: t.timestamp() as f64,
            });
        }
        self.kv.apply(ops).await
    }

    /// Queue `path` for crawling: first-timers land on the new-crawl queue,
    /// known packages get their schedule pulled to now.
    pub async fn bump_crawl(&self, path: &str) -> Result<()> {
        if self.exists(path).await? {
            return self.set_next_crawl(path, Utc::now()).await;
        }
        if self.kv.set_contains(keys::BAD_CRAWL, path).await? {
            return Ok(());
        }
        self.kv
            .apply(vec![WriteOp::SetAdd {
                key: keys::NEW_CRAWL.to_string(),
                member: path.to_string(),
            }])
            .await
    }

    /// Atomically remove one path from the new-crawl queue. The boolean
    /// reports whether packages below the path are already known, so a
    /// directory-only fetch still counts as valid.
    pub async fn pop_new_crawl(&self) -> Result<Option<(String, bool)>> {
        let Some(path) = self.kv.set_pop(keys::NEW_CRAWL).await? else {
            return Ok(None);
        };
        let has_subdirs = !self.subdirectories(&path).await?.is_empty();
        Ok(Some((path, has_subdirs)))
    }

    /// Quarantine a path whose first crawl failed.
    pub async fn add_bad_crawl(&self, path: &str) -> Result<()> {
        self.kv
            .apply(vec![
                WriteOp::SetAdd {
                    key: keys::BAD_CRAWL.to_string(),
                    member: path.to_string(),
                },
                WriteOp::SetRem {
                    key: keys::NEW_CRAWL.to_string(),
                    member: path.to_string(),
                },
            ])
            .await
    }

    async fn enumerate(&self, mut keep: impl FnMut(&str, &PkgRow) -> bool) -> Result<Vec<Package>> {
        let mut out = BTreeMap::new();
        for (path, id) in self.all_ids().await? {
            if let Some(row) = self.row(id).await? {
                if keep(&path, &row) {
                    out.insert(path, row.package());
                }
            }
        }
        Ok(out.into_values().collect())
    }

    /// The standard library, alphabetized.
    pub async fn go_index(&self) -> Result<Vec<Package>> {
        self.enumerate(|path, _| is_standard_path(path)).await
    }

    /// The curated `golang.org/x` extension repositories, alphabetized.
    pub async fn go_subrepo_index(&self) -> Result<Vec<Package>> {
        self.enumerate(|path, _| path.starts_with("golang.org/x/"))
            .await
    }

    /// Every indexed public package, alphabetized.
    pub async fn index(&self) -> Result<Vec<Package>> {
        self.enumerate(|path, row| !is_standard_path(path) && row.score() > 0.0)
            .await
    }

    /// Run `f` over every stored package document.
    pub async fn do_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(PackageDoc) -> Result<()>,
    {
        for (_, id) in self.all_ids().await? {
            if let Some(row) = self.row(id).await? {
                f(row.doc()?)?;
            }
        }
        Ok(())
    }

    /// Read an auxiliary value, e.g. a poller high-water mark.
    pub async fn get_meta(&self, name: &str) -> Result<Option<String>> {
        self.kv.string_get(&keys::meta(name)).await
    }

    /// Persist an auxiliary value.
    pub async fn set_meta(&self, name: &str, value: &str) -> Result<()> {
        self.kv
            .apply(vec![WriteOp::StringSet {
                key: keys::meta(name),
                value: value.to_string(),
            }])
            .await
    }
}

/// Split a query on the term separators of the tokenizer, but keep `.` and
/// `/` inside tokens so path-like queries survive as literal phrases.
fn split_query(q: &str) -> Vec<String> {
    q.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '.' || c == '/'))
        .filter(|t| !t.is_empty())
        .map(|t| t.trim_matches(|c| c == '.' || c == '/').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decl;
    use chrono::Duration;

    fn sample_doc() -> PackageDoc {
        PackageDoc {
            import_path: "example.com/user/repo/foo/bar".to_string(),
            project_root: "example.com/user/repo".to_string(),
            project_name: "foo".to_string(),
            name: "bar".to_string(),
            synopsis: "hello".to_string(),
            doc: "Package bar says hello.".to_string(),
            imports: vec![
                "errors".to_string(),
                "example.com/user/repo/foo/bar".to_string(), // self import
            ],
            funcs: vec![Decl::new("Hello")],
            updated: from_unix(1_221_681_866),
            etag: "abcdef".to_string(),
            vcs: "git".to_string(),
            ..PackageDoc::default()
        }
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = Store::memory();
        let pdoc = sample_doc();
        let next_crawl = from_unix(1_231_681_866);

        store.put(&pdoc, next_crawl).await.unwrap();
        // A zero next-crawl preserves the existing schedule.
        store.put(&pdoc, epoch()).await.unwrap();

        let (got, subdirs, crawl) = store.get(&pdoc.import_path).await.unwrap();
        assert_eq!(got.as_ref(), Some(&pdoc));
        assert!(subdirs.is_empty());
        assert_eq!(crawl, next_crawl);

        // The cursor path resolves to the record due next.
        let (cursor_doc, _, _) = store.get(CURSOR_PATH).await.unwrap();
        assert_eq!(cursor_doc.as_ref(), Some(&pdoc));

        // Parent directories list known packages below them.
        let (parent, subdirs, _) = store.get("example.com/user/repo/foo").await.unwrap();
        assert!(parent.is_none());
        assert_eq!(
            subdirs,
            vec![Package::new("example.com/user/repo/foo/bar", "hello")]
        );
    }

    #[tokio::test]
    async fn test_importer_symmetry() {
        let store = Store::memory();
        let pdoc = sample_doc();
        store.put(&pdoc, from_unix(1_231_681_866)).await.unwrap();

        // The self import counts: exactly one importer.
        let importers = store.importers(&pdoc.import_path).await.unwrap();
        assert_eq!(
            importers,
            vec![Package::new("example.com/user/repo/foo/bar", "hello")]
        );
        assert_eq!(store.importer_count(&pdoc.import_path).await.unwrap(), 1);
        assert_eq!(store.importer_count("errors").await.unwrap(), 1);

        let projected = store.packages(&pdoc.imports).await.unwrap();
        assert_eq!(
            projected,
            vec![
                Package::new("errors", ""),
                Package::new("example.com/user/repo/foo/bar", "hello"),
            ]
        );

        // Dropping the self import removes the edge in the same put.
        let mut updated = pdoc.clone();
        updated.imports = vec!["errors".to_string()];
        store.put(&updated, epoch()).await.unwrap();
        assert_eq!(store.importer_count(&pdoc.import_path).await.unwrap(), 0);
        assert_eq!(store.importer_count("errors").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_next_crawl_only_moves_earlier() {
        let store = Store::memory();
        let pdoc = sample_doc();
        let t = from_unix(1_231_681_866);
        store.put(&pdoc, t).await.unwrap();

        store
            .set_next_crawl(&pdoc.project_root, t + Duration::hours(1))
            .await
            .unwrap();
        let (_, _, crawl) = store.get(&pdoc.import_path).await.unwrap();
        assert_eq!(crawl, t);

        store
            .set_next_crawl(&pdoc.project_root, t - Duration::hours(1))
            .await
            .unwrap();
        let (_, _, crawl) = store.get(&pdoc.import_path).await.unwrap();
        assert_eq!(crawl, t - Duration::hours(1));
    }

    #[tokio::test]
    async fn test_index_diff_atomic_with_delete() {
        let store = Store::memory();
        let pdoc = sample_doc();
        store.put(&pdoc, from_unix(1_231_681_866)).await.unwrap();

        let hits = store.query("bar").await.unwrap();
        assert!(hits.iter().any(|p| p.path == pdoc.import_path));
        let hits = store.query("hello").await.unwrap();
        assert!(hits.iter().any(|p| p.path == pdoc.import_path));

        store.delete(&pdoc.import_path).await.unwrap();
        assert!(store.query("bar").await.unwrap().is_empty());
        let (got, _, _) = store.get(&pdoc.import_path).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_query_path_token_and_determinism() {
        let store = Store::memory();
        let pdoc = sample_doc();
        store.put(&pdoc, from_unix(1_231_681_866)).await.unwrap();

        // Path-like tokens hit the project and import namespaces literally.
        let by_project = store.query("example.com/user/repo").await.unwrap();
        assert!(by_project.iter().any(|p| p.path == pdoc.import_path));
        let by_import = store.query("errors").await.unwrap();
        assert!(by_import.is_empty(), "stemmed term should not leak imports");

        let first = store.query("hello bar").await.unwrap();
        let second = store.query("hello bar").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].import_count, 1);
    }

    #[tokio::test]
    async fn test_block_hierarchy() {
        let store = Store::memory();
        let pdoc = sample_doc();
        store.put(&pdoc, from_unix(1_231_681_866)).await.unwrap();

        store.block("example.com/user/repo").await.unwrap();
        assert!(store
            .is_blocked("example.com/user/repo/foo/bar")
            .await
            .unwrap());
        assert!(store.is_blocked("example.com/user/repo").await.unwrap());
        assert!(!store.is_blocked("example.com/other/repo").await.unwrap());
        assert!(!store.is_blocked("example.com/user/repository").await.unwrap());

        // Blocking removed the stored record.
        let (got, _, _) = store.get(&pdoc.import_path).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_popular_decay_equality() {
        let store = Store::memory();
        let start = from_unix(1_700_000_000);
        let half_life = Duration::seconds(POPULAR_HALF_LIFE_SECS);

        // Thirteen packages, each receiving a halved score one half-life
        // later than the previous. All must end up with equal scores.
        let mut at = start;
        let mut score = 4048.0;
        for i in (0..=12).rev() {
            let path = format!("example.com/user/repo/p{i}");
            store
                .increment_popular_score_at(&path, score, at)
                .await
                .unwrap();
            at += half_life;
            score /= 2.0;
        }

        let entries = store.kv.zset_range(keys::POPULAR, 0, -1).await.unwrap();
        assert_eq!(entries.len(), 13);
        let reference = entries[0].1;
        for (member, value) in &entries {
            assert!(
                ((reference - value) / reference).abs() < 1e-4,
                "score for {member} diverged: {value} vs {reference}"
            );
        }
    }

    #[tokio::test]
    async fn test_popular_renormalization() {
        let store = Store::memory();
        let start = from_unix(1_700_000_000);
        let half_life = Duration::seconds(POPULAR_HALF_LIFE_SECS);

        store
            .increment_popular_score_at("example.com/a/a", 1.0, start)
            .await
            .unwrap();
        store
            .increment_popular_score_at("example.com/b/b", 1.0, start + half_life * 33)
            .await
            .unwrap();

        let t0: i64 = store
            .kv
            .string_get(keys::POPULAR_EPOCH)
            .await
            .unwrap()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(t0, start.timestamp() + 33 * POPULAR_HALF_LIFE_SECS);

        let entries = store.kv.zset_range(keys::POPULAR, 0, -1).await.unwrap();
        assert_eq!(entries.len(), 2);
        // The fresher increment outweighs the old one by 2^33.
        let ratio = entries[1].1 / entries[0].1;
        assert!((ratio.log2() - 33.0).abs() < 1e-6, "ratio {ratio}");
    }

    #[tokio::test]
    async fn test_new_crawl_queue() {
        let store = Store::memory();

        store.bump_crawl("example.com/user/fresh").await.unwrap();
        let (path, has_subdirs) = store.pop_new_crawl().await.unwrap().unwrap();
        assert_eq!(path, "example.com/user/fresh");
        assert!(!has_subdirs);
        assert!(store.pop_new_crawl().await.unwrap().is_none());

        // A failed first crawl quarantines the path.
        store.add_bad_crawl(&path).await.unwrap();
        store.bump_crawl(&path).await.unwrap();
        assert!(store.pop_new_crawl().await.unwrap().is_none());

        // Known parents report their subdirectories.
        let pdoc = sample_doc();
        store.put(&pdoc, from_unix(1_231_681_866)).await.unwrap();
        store.bump_crawl("example.com/user/repo/foo").await.unwrap();
        let (_, has_subdirs) = store.pop_new_crawl().await.unwrap().unwrap();
        assert!(has_subdirs);
    }

    #[tokio::test]
    async fn test_enumerations() {
        let store = Store::memory();
        let mut std_doc = sample_doc();
        std_doc.import_path = "strconv".to_string();
        std_doc.project_root = String::new();
        std_doc.name = "strconv".to_string();
        std_doc.imports.clear();
        store.put(&std_doc, epoch()).await.unwrap();

        let mut subrepo = sample_doc();
        subrepo.import_path = "golang.org/x/tools/cmd/stringer".to_string();
        subrepo.project_root = "golang.org/x/tools".to_string();
        subrepo.name = "stringer".to_string();
        subrepo.imports.clear();
        store.put(&subrepo, epoch()).await.unwrap();

        store.put(&sample_doc(), epoch()).await.unwrap();

        let go = store.go_index().await.unwrap();
        assert_eq!(go.len(), 1);
        assert_eq!(go[0].path, "strconv");

        let x = store.go_subrepo_index().await.unwrap();
        assert_eq!(x.len(), 1);
        assert_eq!(x[0].path, "golang.org/x/tools/cmd/stringer");

        let indexed = store.index().await.unwrap();
        assert!(indexed.iter().any(|p| p.path == sample_doc().import_path));
        assert!(indexed.iter().all(|p| p.path != "strconv"));

        let mut count = 0;
        store
            .do_each(|_| {
                count += 1;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_meta_roundtrip() {
        let store = Store::memory();
        assert_eq!(store.get_meta("githubUpdated").await.unwrap(), None);
        store
            .set_meta("githubUpdated", "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        assert_eq!(
            store.get_meta("githubUpdated").await.unwrap().as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
    }

    #[tokio::test]
    async fn test_import_graph() {
        let store = Store::memory();
        let lib = sample_doc();
        store.put(&lib, epoch()).await.unwrap();

        let mut app = sample_doc();
        app.import_path = "example.com/user/app".to_string();
        app.project_root = "example.com/user/app".to_string();
        app.name = "app".to_string();
        app.imports = vec![lib.import_path.clone()];
        store.put(&app, epoch()).await.unwrap();

        let (nodes, edges) = store.import_graph(&lib.import_path, false).await.unwrap();
        let paths: Vec<&str> = nodes.iter().map(|p| p.path.as_str()).collect();
        assert!(paths.contains(&"example.com/user/app"));
        // app imports lib: edge from app's node to the root node.
        let app_idx = paths
            .iter()
            .position(|p| *p == "example.com/user/app")
            .unwrap();
        assert!(edges.contains(&(app_idx, 0)));
    }
}
