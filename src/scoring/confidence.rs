//! Link confidence fusion
//!
//! Each report is weighted by its discovery-source prior and its own raw confidence,
//! decayed once it is older than the freshness window. Reports for the same interface
//! pair are fused with a probabilistic OR: `1 - Π(1 - w_i)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::ScorerSettings;
use crate::error::Result;
use crate::models::{DiscoverySource, InterfaceId, Link, LinkId};
use crate::topology::TopologySnapshot;

/// One weighted adjacency claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub source: DiscoverySource,
    pub confidence: f64,
    /// Age at the reference instant; None when the report carries no timestamp.
    pub age_secs: Option<f64>,
}

impl Evidence {
    pub fn new(source: DiscoverySource, confidence: f64) -> Self {
        Self {
            source,
            confidence,
            age_secs: None,
        }
    }

    pub fn aged(mut self, age_secs: f64) -> Self {
        self.age_secs = Some(age_secs);
        self
    }
}

/// Fused view of every report on one interface pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    pub confidence: f64,
    /// Lowest link id among the scored reports
    pub representative: LinkId,
    pub reports: usize,
    pub sources: BTreeSet<DiscoverySource>,
    /// Lowest measured latency among the scored reports
    pub latency_ms: Option<f64>,
    /// Highest reported speed among the scored reports
    pub speed_mbps: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    settings: ScorerSettings,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ConfidenceScorer {
    pub fn new(settings: ScorerSettings) -> Self {
        Self { settings }
    }

    pub fn from_env() -> Self {
        Self::new(ScorerSettings::from_env())
    }

    pub fn settings(&self) -> &ScorerSettings {
        &self.settings
    }

    /// Staleness multiplier in (0,1].
    pub fn decay(&self, age_secs: Option<f64>) -> f64 {
        let Some(age) = age_secs.filter(|a| a.is_finite()) else {
            return 1.0;
        };
        let window = self.settings.freshness_window_secs as f64;
        if age <= window {
            return 1.0;
        }
        let half_life = self.settings.stale_half_life_secs.max(1) as f64;
        (-std::f64::consts::LN_2 * (age - window) / half_life).exp()
    }

    pub fn weight(&self, evidence: &Evidence) -> f64 {
        let raw = if evidence.confidence.is_nan() {
            0.0
        } else {
            evidence.confidence.clamp(0.0, 1.0)
        };
        let prior = self.settings.prior(evidence.source).clamp(0.0, 1.0);
        (prior * raw * self.decay(evidence.age_secs)).clamp(0.0, 1.0)
    }

    /// Probabilistic OR of the evidence weights. Empty evidence scores 0.
    pub fn fuse<'a, I>(&self, evidence: I) -> f64
    where
        I: IntoIterator<Item = &'a Evidence>,
    {
        let mut weights: Vec<f64> = evidence.into_iter().map(|e| self.weight(e)).collect();
        if weights.is_empty() {
            return 0.0;
        }
        // fixed multiplication order keeps the result independent of input order
        weights.sort_by(f64::total_cmp);
        let miss = weights.iter().fold(1.0_f64, |acc, w| acc * (1.0 - w));
        (1.0 - miss).clamp(0.0, 1.0)
    }

    pub fn evidence_for(&self, link: &Link, reference: DateTime<Utc>) -> Evidence {
        let age_secs = link.last_seen.map(|seen| {
            let age = reference.signed_duration_since(seen);
            (age.num_milliseconds().max(0) as f64) / 1000.0
        });
        Evidence {
            source: link.discovery,
            confidence: link.confidence,
            age_secs,
        }
    }

    /// Fused confidence of the adjacency a link claims, using every report on the
    /// same interface pair in the snapshot.
    pub fn score_link(&self, snapshot: &TopologySnapshot, link: &Link) -> Result<f64> {
        let mut reports = snapshot.links_between(link.source.as_str(), link.target.as_str())?;
        if !reports.iter().any(|r| r.id == link.id) {
            reports.push(link);
        }
        let reference = snapshot.captured_at();
        let evidence: Vec<Evidence> = reports
            .iter()
            .map(|r| self.evidence_for(r, reference))
            .collect();
        Ok(self.fuse(&evidence))
    }

    /// Score every interface pair. With `only_up`, down reports are ignored and pairs
    /// with no up report are omitted.
    pub fn score_pairs(
        &self,
        snapshot: &TopologySnapshot,
        only_up: bool,
    ) -> BTreeMap<(InterfaceId, InterfaceId), PairScore> {
        let reference = snapshot.captured_at();
        let mut grouped: BTreeMap<(InterfaceId, InterfaceId), Vec<&Link>> = BTreeMap::new();
        for link in snapshot.links().filter(|l| l.is_up || !only_up) {
            grouped.entry(link.interface_pair()).or_default().push(link);
        }

        grouped
            .into_iter()
            .filter_map(|(pair, reports)| {
                let representative = reports.iter().map(|l| &l.id).min()?.clone();
                let evidence: Vec<Evidence> = reports
                    .iter()
                    .map(|l| self.evidence_for(l, reference))
                    .collect();
                let latency_ms = reports
                    .iter()
                    .filter_map(|l| l.latency_ms)
                    .min_by(f64::total_cmp);
                let speed_mbps = reports.iter().filter_map(|l| l.speed_mbps).max();
                let score = PairScore {
                    confidence: self.fuse(&evidence),
                    representative,
                    reports: reports.len(),
                    sources: reports.iter().map(|l| l.discovery).collect(),
                    latency_ms,
                    speed_mbps,
                };
                Some((pair, score))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        FRESHNESS_WINDOW_SECS, PRIOR_CDP, PRIOR_LLDP, PRIOR_MANUAL, PRIOR_SNMP,
        STALE_HALF_LIFE_SECS,
    };
    use crate::models::{Device, Interface};
    use crate::topology::TopologyDocument;
    use proptest::prelude::*;

    fn scorer() -> ConfidenceScorer {
        ConfidenceScorer::new(ScorerSettings {
            prior_lldp: PRIOR_LLDP,
            prior_cdp: PRIOR_CDP,
            prior_snmp: PRIOR_SNMP,
            prior_manual: PRIOR_MANUAL,
            freshness_window_secs: FRESHNESS_WINDOW_SECS,
            stale_half_life_secs: STALE_HALF_LIFE_SECS,
        })
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn single_source_is_capped_by_prior() {
        let s = scorer();
        assert_close(s.fuse(&[Evidence::new(DiscoverySource::Lldp, 1.0)]), 0.9);
        assert_close(s.fuse(&[Evidence::new(DiscoverySource::Snmp, 0.5)]), 0.3);
        assert_close(s.fuse(&[Evidence::new(DiscoverySource::Manual, 1.0)]), 1.0);
    }

    #[test]
    fn agreement_increases_confidence() {
        let s = scorer();
        let both = [
            Evidence::new(DiscoverySource::Lldp, 1.0),
            Evidence::new(DiscoverySource::Cdp, 1.0),
        ];
        // 1 - (0.1 * 0.15)
        assert_close(s.fuse(&both), 0.985);
    }

    #[test]
    fn empty_evidence_scores_zero() {
        assert_eq!(scorer().fuse(std::iter::empty::<&Evidence>()), 0.0);
    }

    #[test]
    fn stale_reports_decay() {
        let s = scorer();
        let fresh = Evidence::new(DiscoverySource::Lldp, 1.0).aged(10.0);
        let half_life_age = (FRESHNESS_WINDOW_SECS + STALE_HALF_LIFE_SECS) as f64;
        let one_half_life = Evidence::new(DiscoverySource::Lldp, 1.0).aged(half_life_age);
        assert_close(s.weight(&fresh), 0.9);
        assert_close(s.weight(&one_half_life), 0.45);
    }

    #[test]
    fn out_of_range_raw_confidence_is_clamped() {
        let s = scorer();
        assert_close(s.weight(&Evidence::new(DiscoverySource::Manual, 7.0)), 1.0);
        assert_eq!(s.weight(&Evidence::new(DiscoverySource::Manual, f64::NAN)), 0.0);
    }

    #[test]
    fn score_link_fuses_parallel_reports() {
        let now = Utc::now();
        let doc = TopologyDocument::new(now)
            .device(Device::new("a"))
            .device(Device::new("b"))
            .interface(Interface::new("a:1", "a"))
            .interface(Interface::new("b:1", "b"))
            .link(Link::new("l1", "a:1", "b:1", DiscoverySource::Lldp).seen_at(now))
            .link(Link::new("l2", "b:1", "a:1", DiscoverySource::Cdp).seen_at(now));
        let snapshot = TopologySnapshot::from_document(&doc).unwrap();
        let l1 = snapshot.link("l1").unwrap();

        assert_close(scorer().score_link(&snapshot, l1).unwrap(), 0.985);

        let pairs = scorer().score_pairs(&snapshot, true);
        let pair = pairs.values().next().expect("one pair");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pair.reports, 2);
        assert_eq!(pair.representative.as_str(), "l1");
    }

    #[test]
    fn score_link_ages_reports_against_capture_time() {
        let captured = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let one_half_life =
            chrono::Duration::seconds((FRESHNESS_WINDOW_SECS + STALE_HALF_LIFE_SECS) as i64);
        let doc = TopologyDocument::new(captured)
            .device(Device::new("a"))
            .device(Device::new("b"))
            .device(Device::new("c"))
            .interface(Interface::new("a:1", "a"))
            .interface(Interface::new("b:1", "b"))
            .interface(Interface::new("c:1", "c"))
            .link(
                Link::new("stale", "a:1", "b:1", DiscoverySource::Lldp)
                    .seen_at(captured - one_half_life),
            )
            .link(Link::new("fresh", "b:1", "c:1", DiscoverySource::Lldp).seen_at(captured));
        let snapshot = TopologySnapshot::from_document(&doc).unwrap();
        let s = scorer();

        assert_close(s.score_link(&snapshot, snapshot.link("stale").unwrap()).unwrap(), 0.45);
        // Wall clock is far past the capture; only capture time counts.
        assert_close(s.score_link(&snapshot, snapshot.link("fresh").unwrap()).unwrap(), 0.9);
    }

    #[test]
    fn down_reports_are_dropped_when_only_up() {
        let doc = TopologyDocument::new(Utc::now())
            .device(Device::new("a"))
            .device(Device::new("b"))
            .interface(Interface::new("a:1", "a"))
            .interface(Interface::new("b:1", "b"))
            .link(Link::new("l1", "a:1", "b:1", DiscoverySource::Lldp).with_up(false));
        let snapshot = TopologySnapshot::from_document(&doc).unwrap();

        assert!(scorer().score_pairs(&snapshot, true).is_empty());
        assert_eq!(scorer().score_pairs(&snapshot, false).len(), 1);
    }

    fn source_strategy() -> impl Strategy<Value = DiscoverySource> {
        prop_oneof![
            Just(DiscoverySource::Lldp),
            Just(DiscoverySource::Cdp),
            Just(DiscoverySource::Snmp),
            Just(DiscoverySource::Manual),
        ]
    }

    fn evidence_strategy() -> impl Strategy<Value = Evidence> {
        (
            source_strategy(),
            0.0f64..=1.0,
            proptest::option::of(0.0f64..100_000.0),
        )
            .prop_map(|(source, confidence, age_secs)| Evidence {
                source,
                confidence,
                age_secs,
            })
    }

    proptest! {
        #[test]
        fn fused_score_stays_in_unit_interval(evidence in proptest::collection::vec(evidence_strategy(), 0..12)) {
            let score = scorer().fuse(&evidence);
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn corroboration_never_lowers_score(
            evidence in proptest::collection::vec(evidence_strategy(), 0..12),
            extra in evidence_strategy(),
        ) {
            let s = scorer();
            let before = s.fuse(&evidence);
            let mut more = evidence.clone();
            more.push(extra);
            prop_assert!(s.fuse(&more) >= before - 1e-12);
        }

        #[test]
        fn fusion_is_order_independent(evidence in proptest::collection::vec(evidence_strategy(), 0..12)) {
            let s = scorer();
            let mut reversed = evidence.clone();
            reversed.reverse();
            prop_assert_eq!(s.fuse(&evidence), s.fuse(&reversed));
        }
    }
}
