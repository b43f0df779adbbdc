//! Endpoint path templates.
//!
//! An [`EndpointPath`] is an ordered list of path segments, each either
//! fixed (one string, or several joined by `/`) or mutable (a finite
//! set of alternatives). Expansion interpolates the Cartesian product
//! of the mutable segments in priority order.

/// One segment of an endpoint path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SegmentKind {
    /// Always present; multi-part values are joined by `/`.
    Fixed(Vec<String>),
    /// Exactly one of the alternatives per expanded path.
    Mutable(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    prior: u32,
    kind: SegmentKind,
}

/// Path suffix attached to a resource base URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointPath {
    id: String,
    segments: Vec<Segment>,
}

impl EndpointPath {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            segments: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Highest priority currently assigned to a segment.
    pub fn last_prior(&self) -> u32 {
        self.segments.iter().map(|s| s.prior).max().unwrap_or(0)
    }

    fn next_prior(&self, prior: Option<u32>) -> u32 {
        prior.unwrap_or_else(|| {
            if self.segments.is_empty() {
                0
            } else {
                self.last_prior() + 1
            }
        })
    }

    /// Append a fixed segment. Without an explicit priority it lands
    /// after every existing segment.
    pub fn add_fix_part(&mut self, part: impl Into<String>, prior: Option<u32>) -> &mut Self {
        let prior = self.next_prior(prior);
        self.segments.push(Segment {
            prior,
            kind: SegmentKind::Fixed(vec![part.into()]),
        });
        self
    }

    /// Append a fixed segment made of several parts joined by `/`.
    pub fn add_fix_parts<I, S>(&mut self, parts: I, prior: Option<u32>) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prior = self.next_prior(prior);
        self.segments.push(Segment {
            prior,
            kind: SegmentKind::Fixed(parts.into_iter().map(Into::into).collect()),
        });
        self
    }

    /// Append a mutable segment: one expansion per alternative.
    pub fn add_mutable_parts<I, S>(&mut self, parts: I, prior: Option<u32>) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prior = self.next_prior(prior);
        self.segments.push(Segment {
            prior,
            kind: SegmentKind::Mutable(parts.into_iter().map(Into::into).collect()),
        });
        self
    }

    /// Number of paths [`expand`](Self::expand) will produce.
    pub fn expansion_count(&self) -> usize {
        self.segments
            .iter()
            .map(|s| match &s.kind {
                SegmentKind::Fixed(_) => 1,
                SegmentKind::Mutable(alts) => alts.len(),
            })
            .product()
    }

    /// All concrete path suffixes, in priority order, one per element
    /// of the Cartesian product of the mutable segments.
    pub fn expand(&self) -> Vec<String> {
        let mut ordered: Vec<&Segment> = self.segments.iter().collect();
        ordered.sort_by_key(|s| s.prior);

        let mut paths = vec![String::new()];
        for segment in ordered {
            let choices: Vec<String> = match &segment.kind {
                SegmentKind::Fixed(parts) => vec![parts.join("/")],
                SegmentKind::Mutable(alts) => alts.clone(),
            };
            let mut next = Vec::with_capacity(paths.len() * choices.len());
            for prefix in &paths {
                for choice in &choices {
                    if prefix.is_empty() {
                        next.push(choice.clone());
                    } else {
                        next.push(format!("{prefix}/{choice}"));
                    }
                }
            }
            paths = next;
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_only_yields_one_path() {
        let mut ep = EndpointPath::new("income");
        ep.add_fix_part("income-statement", Some(0));
        assert_eq!(ep.expand(), vec!["income-statement".to_string()]);
    }

    #[test]
    fn mutable_segments_multiply() {
        let mut ep = EndpointPath::new("quotes");
        ep.add_fix_part("quote", None);
        ep.add_mutable_parts(["AAPL", "MSFT", "AMZN"], None);
        let paths = ep.expand();
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0], "quote/AAPL");
        assert_eq!(ep.expansion_count(), 3);
    }

    #[test]
    fn priorities_reorder_segments() {
        let mut ep = EndpointPath::new("balance");
        ep.add_mutable_parts(["x", "y"], Some(1));
        ep.add_fix_part("balance-sheet", Some(0));
        let paths = ep.expand();
        assert_eq!(paths, vec!["balance-sheet/x", "balance-sheet/y"]);
    }

    #[test]
    fn two_mutable_segments_form_a_product() {
        let mut ep = EndpointPath::new("grid");
        ep.add_mutable_parts(["a", "b"], None);
        ep.add_mutable_parts(["1", "2", "3"], None);
        assert_eq!(ep.expand().len(), 6);
        assert_eq!(ep.expansion_count(), 6);
    }

    #[test]
    fn multi_part_fixed_segment_joins_with_slash() {
        let mut ep = EndpointPath::new("deep");
        ep.add_fix_parts(["v3", "report"], None);
        assert_eq!(ep.expand(), vec!["v3/report"]);
    }
}
