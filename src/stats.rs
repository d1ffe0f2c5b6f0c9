use std::fmt;

use webrtc::{
    ice::candidate::CandidatePairState,
    stats::{StatsReport, StatsReportType},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Endpoints of the candidate pair currently carrying traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub local: Option<Endpoint>,
    pub remote: Endpoint,
}

#[derive(Debug, Clone)]
struct PairRecord {
    local_id: String,
    remote_id: String,
    nominated: bool,
    succeeded: bool,
}

#[derive(Debug, Clone)]
struct CandidateRecord {
    id: String,
    remote: bool,
    endpoint: Endpoint,
}

pub fn snapshot(report: &StatsReport) -> Option<StatsSnapshot> {
    let mut pairs = Vec::new();
    let mut candidates = Vec::new();
    for stat in report.reports.values() {
        match stat {
            StatsReportType::CandidatePair(pair) => pairs.push(PairRecord {
                local_id: pair.local_candidate_id.clone(),
                remote_id: pair.remote_candidate_id.clone(),
                nominated: pair.nominated,
                succeeded: matches!(pair.state, CandidatePairState::Succeeded),
            }),
            StatsReportType::LocalCandidate(c) => candidates.push(CandidateRecord {
                id: c.id.clone(),
                remote: false,
                endpoint: Endpoint {
                    ip: c.ip.clone(),
                    port: c.port,
                },
            }),
            StatsReportType::RemoteCandidate(c) => candidates.push(CandidateRecord {
                id: c.id.clone(),
                remote: true,
                endpoint: Endpoint {
                    ip: c.ip.clone(),
                    port: c.port,
                },
            }),
            _ => {}
        }
    }
    select(&pairs, &candidates)
}

fn select(pairs: &[PairRecord], candidates: &[CandidateRecord]) -> Option<StatsSnapshot> {
    let pair = pairs.iter().find(|p| p.nominated && p.succeeded)?;
    let lookup = |remote: bool, id: &str| {
        candidates
            .iter()
            .find(|c| c.remote == remote && c.id == id)
            .map(|c| c.endpoint.clone())
    };
    Some(StatsSnapshot {
        remote: lookup(true, &pair.remote_id)?,
        local: lookup(false, &pair.local_id),
    })
}
