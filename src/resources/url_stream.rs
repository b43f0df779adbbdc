//! Page-aware URL streams.
//!
//! A [`UrlPlan`] captures the finite axes of a request (endpoint
//! expansions and query-parameter tuples); [`UrlStream`] walks them
//! lazily, innermost axis first, with an explicit
//! [`advance_axis`](UrlStream::advance_axis) escape hatch replacing the
//! original coroutine sentinel.

/// Finite description of every URL a request can produce.
#[derive(Debug, Clone)]
pub struct UrlPlan {
    /// Fully expanded `<base>/<segments>` prefixes.
    bases: Vec<String>,
    /// Query parameters present on every URL, in declaration order.
    fix_params: Vec<(String, String)>,
    /// Varying query parameters; one value per parameter per URL.
    mutable_params: Vec<(String, Vec<String>)>,
    has_pages: bool,
}

impl UrlPlan {
    pub fn new(
        bases: Vec<String>,
        fix_params: Vec<(String, String)>,
        mutable_params: Vec<(String, Vec<String>)>,
        has_pages: bool,
    ) -> Self {
        Self {
            bases,
            fix_params,
            // Mutable values are traversed newest-first, mirroring the
            // stack-driven walk of the collection loop.
            mutable_params: mutable_params
                .into_iter()
                .map(|(k, mut vs)| {
                    vs.reverse();
                    (k, vs)
                })
                .collect(),
            has_pages,
        }
    }

    /// Number of distinct URLs ignoring pagination.
    pub fn unpaged_count(&self) -> usize {
        self.bases.len() * self.tuple_count()
    }

    fn tuple_count(&self) -> usize {
        self.mutable_params.iter().map(|(_, vs)| vs.len().max(1)).product()
    }

    pub fn stream(&self) -> UrlStream {
        UrlStream {
            plan: self.clone(),
            base_idx: 0,
            tuple_idx: 0,
            page: 1,
            last: None,
            finished: self.bases.is_empty(),
        }
    }

    // Render the URL for one (base, tuple, page) coordinate.
    fn render(&self, base_idx: usize, tuple_idx: usize, page: Option<u64>) -> String {
        let mut params: Vec<(String, String)> = self.fix_params.clone();

        // Decompose the flat tuple index; the last parameter varies fastest.
        let mut rem = tuple_idx;
        let mut chosen = vec![None; self.mutable_params.len()];
        for (i, (_, vs)) in self.mutable_params.iter().enumerate().rev() {
            let n = vs.len().max(1);
            chosen[i] = vs.get(rem % n).cloned();
            rem /= n;
        }
        for ((name, _), value) in self.mutable_params.iter().zip(chosen) {
            if let Some(value) = value {
                params.push((name.clone(), value));
            }
        }
        if let Some(page) = page {
            params.push(("page".to_string(), page.to_string()));
        }

        let base = &self.bases[base_idx];
        if params.is_empty() {
            return base.clone();
        }
        let query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{base}?{}", query.join("&"))
    }
}

/// Lazy walker over a [`UrlPlan`].
///
/// Axis nesting: endpoint expansion (outer) x parameter tuple x page
/// (inner, only when paginated). `next` yields URLs in that order;
/// `advance_axis` abandons the current innermost axis when the caller
/// has detected end-of-resource.
#[derive(Debug)]
pub struct UrlStream {
    plan: UrlPlan,
    base_idx: usize,
    tuple_idx: usize,
    page: u64,
    /// Coordinate of the most recently yielded URL.
    last: Option<(usize, usize)>,
    finished: bool,
}

impl UrlStream {
    pub fn next_url(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }
        let page = self.plan.has_pages.then_some(self.page);
        let url = self.plan.render(self.base_idx, self.tuple_idx, page);
        self.last = Some((self.base_idx, self.tuple_idx));
        if self.plan.has_pages {
            self.page += 1;
        } else {
            // Unpaged: each tuple yields exactly once.
            self.step_tuple();
        }
        Some(url)
    }

    /// Collect up to `n` URLs.
    pub fn take(&mut self, n: usize) -> Vec<String> {
        let mut urls = Vec::with_capacity(n);
        while urls.len() < n {
            match self.next_url() {
                Some(url) => urls.push(url),
                None => break,
            }
        }
        urls
    }

    /// Abandon the current innermost axis: the page loop when
    /// paginated, the remaining parameter tuples of the current
    /// endpoint otherwise. Returns `false` once nothing is left.
    pub fn advance_axis(&mut self) -> bool {
        if self.finished {
            return false;
        }
        let Some((base, tuple)) = self.last else {
            // Nothing yielded yet; there is nothing to abandon.
            return true;
        };
        if self.plan.has_pages {
            let mut next_base = base;
            let mut next_tuple = tuple + 1;
            if next_tuple >= self.plan.tuple_count() {
                next_tuple = 0;
                next_base = base + 1;
            }
            if next_base >= self.plan.bases.len() {
                self.finished = true;
                return false;
            }
            self.base_idx = next_base;
            self.tuple_idx = next_tuple;
            self.page = 1;
        } else {
            let next_base = base + 1;
            if next_base >= self.plan.bases.len() {
                self.finished = true;
                return false;
            }
            self.base_idx = next_base;
            self.tuple_idx = 0;
        }
        true
    }

    // Unpaged cursor step: tuple, cascading into the endpoint axis.
    fn step_tuple(&mut self) {
        self.tuple_idx += 1;
        if self.tuple_idx >= self.plan.tuple_count() {
            self.tuple_idx = 0;
            self.base_idx += 1;
            if self.base_idx >= self.plan.bases.len() {
                self.finished = true;
            }
        }
    }
}
