use std::cmp::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;

use super::{ExecutionMode, ReactorHandler};

/// A `(host, path)` routing rule bound to a reactor.
#[derive(Debug, Clone)]
pub struct Acceptor {
    host: Option<String>,
    path: String,
    handler: ReactorHandler,
}

/// Strip a trailing `:port`, keeping bracketed IPv6 literals intact.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 2);
    if !path.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(path);
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

impl Acceptor {
    /// `path` is normalized to start and end with `/`; an empty host means any host.
    #[must_use]
    pub fn new(host: Option<&str>, path: &str, handler: ReactorHandler) -> Self {
        Self {
            host: host
                .map(|h| strip_port(h.trim()).to_ascii_lowercase())
                .filter(|h| !h.is_empty()),
            path: normalize_path(path),
            handler,
        }
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Normalized context path, always ending with `/`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn handler(&self) -> &ReactorHandler {
        &self.handler
    }

    #[must_use]
    pub fn execution_mode(&self) -> ExecutionMode {
        self.handler.execution_mode()
    }

    fn is_wildcard(&self) -> bool {
        self.host.as_deref().is_some_and(|h| h.starts_with("*."))
    }

    fn accepts_host(&self, request_host: Option<&str>) -> bool {
        let Some(expected) = self.host.as_deref() else {
            return true;
        };
        let Some(request_host) = request_host else {
            return false;
        };
        let request_host = strip_port(request_host);
        match expected.strip_prefix('*').filter(|s| s.starts_with('.')) {
            // ".example.com": any deeper subdomain, never the bare domain
            Some(suffix) => {
                request_host.len() > suffix.len()
                    && request_host
                        .get(request_host.len() - suffix.len()..)
                        .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix))
            }
            None => request_host.eq_ignore_ascii_case(expected),
        }
    }

    fn accepts_path(&self, request_path: &str) -> bool {
        if request_path.starts_with(&self.path) {
            return true;
        }
        // "/products" matches the acceptor "/products/"
        !request_path.ends_with('/')
            && self.path.len() == request_path.len() + 1
            && self.path.starts_with(request_path)
    }

    /// Whether this acceptor serves a request for `host` and `path`.
    #[must_use]
    pub fn accepts(&self, host: Option<&str>, path: &str) -> bool {
        self.accepts_host(host) && self.accepts_path(path)
    }

    /// Resolution priority: host-bound first, exact before wildcard, longer
    /// host first, then longer path first.
    fn priority(&self, other: &Self) -> Ordering {
        other
            .host
            .is_some()
            .cmp(&self.host.is_some())
            .then_with(|| self.is_wildcard().cmp(&other.is_wildcard()))
            .then_with(|| {
                let len = |a: &Acceptor| a.host.as_ref().map_or(0, String::len);
                len(other).cmp(&len(self))
            })
            .then_with(|| other.path.len().cmp(&self.path.len()))
    }
}

/// Read-mostly routing table.
///
/// Readers never lock: [`resolve`](Self::resolve) loads the current snapshot
/// and scans it in priority order.
pub struct AcceptorTable {
    acceptors: ArcSwap<Vec<Arc<Acceptor>>>,
}

impl Default for AcceptorTable {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn sorted(mut acceptors: Vec<Arc<Acceptor>>) -> Vec<Arc<Acceptor>> {
    acceptors.sort_by(|a, b| a.priority(b));
    acceptors
}

impl AcceptorTable {
    #[must_use]
    pub fn new(acceptors: Vec<Acceptor>) -> Self {
        Self {
            acceptors: ArcSwap::from_pointee(sorted(acceptors.into_iter().map(Arc::new).collect())),
        }
    }

    /// Replace every acceptor in one atomic swap.
    pub fn update(&self, acceptors: Vec<Acceptor>) {
        let table = sorted(acceptors.into_iter().map(Arc::new).collect());
        debug!(acceptors = table.len(), "Acceptor table updated");
        self.acceptors.store(Arc::new(table));
    }

    /// Add one acceptor, keeping the table sorted.
    pub fn register(&self, acceptor: Acceptor) {
        let acceptor = Arc::new(acceptor);
        self.acceptors.rcu(|current| {
            let mut next: Vec<Arc<Acceptor>> = current.iter().map(Arc::clone).collect();
            next.push(Arc::clone(&acceptor));
            sorted(next)
        });
    }

    /// Remove every acceptor bound to `path` (normalized like [`Acceptor::new`]).
    pub fn unregister_path(&self, path: &str) {
        let path = normalize_path(path);
        self.acceptors.rcu(|current| {
            current
                .iter()
                .filter(|a| a.path != path)
                .map(Arc::clone)
                .collect::<Vec<_>>()
        });
    }

    /// First acceptor, in priority order, serving `host` and `path`.
    #[must_use]
    pub fn resolve(&self, host: Option<&str>, path: &str) -> Option<Arc<Acceptor>> {
        self.acceptors
            .load()
            .iter()
            .find(|a| a.accepts(host, path))
            .map(Arc::clone)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.acceptors.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current snapshot, in resolution order.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Arc<Acceptor>>> {
        self.acceptors.load_full()
    }
}

impl std::fmt::Debug for AcceptorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcceptorTable").field("acceptors", &self.len()).finish()
    }
}
