// src/matching/reconcile.rs
//
// Two-pass reconciliation of MI spend lines onto contracts:
//   1. exact join on `<supplier key>+<lowercased buyer>`
//   2. residual customer names resolved by an oracle, re-keyed and joined again
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use crate::errors::{IdentifierError, OracleError};
use crate::matching::candidate_pool::CandidatePool;
use crate::matching::oracle::{resolve_and_validate, MatchOracle};
use crate::matching::pair_key::{normalize_registration_number, normalize_supplier_key, PairKey};
use crate::models::matching::{MatchDecision, MatchSource, ReconciledRow, UnmatchedReason, UnmatchedRow};
use crate::models::records::{ContractRecord, MiRecord, RegistrationKeyPair};
use crate::models::stats_models::ReconcileStats;
use crate::utils::logging::{Stage, StageLogger};
use crate::utils::progress_config::ProgressConfig;

/// A contract after the registration-number bridge gave it a supplier key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedContract {
    pub contract: ContractRecord,
    pub supplier_key: String,
}

impl KeyedContract {
    pub fn pair_key(&self) -> PairKey {
        PairKey::new(&self.supplier_key, &self.contract.buyer)
    }
}

/// An MI line with its canonical key; `None` when the feed left it blank.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedMi {
    pub record: MiRecord,
    pub supplier_key: Option<String>,
}

/// Inner join of contracts onto the registration bridge. Contracts whose
/// registration number has no supplier key drop out; one registration
/// number mapping to several keys yields one keyed contract per key.
pub fn attach_supplier_keys(
    contracts: &[ContractRecord],
    bridge: &[RegistrationKeyPair],
) -> Result<Vec<KeyedContract>, IdentifierError> {
    let mut keys_by_reg: HashMap<String, Vec<String>> = HashMap::new();
    for pair in bridge {
        let (Some(reg), Some(key)) = (
            normalize_registration_number(&pair.registration_number),
            normalize_supplier_key(&pair.supplier_key)?,
        ) else {
            continue;
        };
        let keys = keys_by_reg.entry(reg).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    let mut keyed = Vec::new();
    for contract in contracts {
        let Some(reg) = normalize_registration_number(&contract.registration_number) else {
            continue;
        };
        if let Some(keys) = keys_by_reg.get(&reg) {
            for key in keys {
                keyed.push(KeyedContract {
                    contract: contract.clone(),
                    supplier_key: key.clone(),
                });
            }
        }
    }
    Ok(keyed)
}

pub fn key_mi_records(records: &[MiRecord]) -> Result<Vec<KeyedMi>, IdentifierError> {
    records
        .iter()
        .map(|record| {
            Ok(KeyedMi {
                supplier_key: normalize_supplier_key(&record.supplier_key)?,
                record: record.clone(),
            })
        })
        .collect()
}

/// State after the exact join, before any oracle call.
#[derive(Debug, Clone)]
pub struct FirstPass {
    contracts: Vec<KeyedContract>,
    mi: Vec<KeyedMi>,
    pool: CandidatePool,
    contracts_by_key: HashMap<PairKey, Vec<usize>>,
    /// (mi index, contract index)
    exact: Vec<(usize, usize)>,
    exempt: Vec<usize>,
    missing_key: Vec<usize>,
    residual: Vec<usize>,
}

impl FirstPass {
    pub fn run(contracts: Vec<KeyedContract>, mi: Vec<KeyedMi>) -> Self {
        let logger = StageLogger::new(Stage::Join);
        let pool = CandidatePool::from_contracts(contracts.iter().map(|c| &c.contract));

        let mut contracts_by_key: HashMap<PairKey, Vec<usize>> = HashMap::new();
        for (idx, contract) in contracts.iter().enumerate() {
            contracts_by_key.entry(contract.pair_key()).or_default().push(idx);
        }

        let mut exact = Vec::new();
        let mut exempt = Vec::new();
        let mut missing_key = Vec::new();
        let mut residual = Vec::new();
        for (mi_idx, row) in mi.iter().enumerate() {
            let Some(key) = &row.supplier_key else {
                missing_key.push(mi_idx);
                continue;
            };
            let pair_key = PairKey::new(key, &row.record.customer_name);
            match contracts_by_key.get(&pair_key) {
                Some(hits) => exact.extend(hits.iter().map(|&c| (mi_idx, c))),
                // The name is already a known buyer; the supplier key is what failed.
                None if pool.contains_ignore_case(&row.record.customer_name) => exempt.push(mi_idx),
                None => residual.push(mi_idx),
            }
        }

        logger.log_phase(
            "Exact join",
            Some(&format!(
                "{} joins, {} exempt, {} missing keys, {} residual rows",
                exact.len(),
                exempt.len(),
                missing_key.len(),
                residual.len()
            )),
        );

        Self {
            contracts,
            mi,
            pool,
            contracts_by_key,
            exact,
            exempt,
            missing_key,
            residual,
        }
    }

    pub fn pool(&self) -> &CandidatePool {
        &self.pool
    }

    /// Distinct residual customer names in ascending order; the only names
    /// ever offered to an oracle.
    pub fn residual_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .residual
            .iter()
            .map(|&i| self.mi[i].record.customer_name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Second pass: re-key residual rows with their accepted matches, join
    /// again, and settle every MI row as matched or unmatched-with-reason.
    /// Residual names absent from `decisions` are reported as `OracleDisabled`.
    pub fn finish(self, decisions: &HashMap<String, MatchDecision>) -> Reconciliation {
        let mut joins: BTreeMap<usize, Vec<(usize, MatchSource)>> = BTreeMap::new();
        for &(mi_idx, c_idx) in &self.exact {
            joins.entry(c_idx).or_default().push((mi_idx, MatchSource::Exact));
        }

        let mut unmatched: Vec<(usize, UnmatchedReason, Option<MatchDecision>)> = Vec::new();
        for &mi_idx in &self.exempt {
            unmatched.push((mi_idx, UnmatchedReason::IdentifierMismatch, None));
        }
        for &mi_idx in &self.missing_key {
            unmatched.push((mi_idx, UnmatchedReason::MissingSupplierKey, None));
        }

        let mut oracle_matched_rows = 0;
        for &mi_idx in &self.residual {
            let row = &self.mi[mi_idx];
            let name = &row.record.customer_name;
            let Some(decision) = decisions.get(name) else {
                unmatched.push((mi_idx, UnmatchedReason::OracleDisabled, None));
                continue;
            };
            let Some(matched_name) = decision.matched_name() else {
                unmatched.push((mi_idx, UnmatchedReason::NoOracleMatch, Some(decision.clone())));
                continue;
            };
            let hits = row
                .supplier_key
                .as_deref()
                .and_then(|key| self.contracts_by_key.get(&PairKey::new(key, matched_name)));
            match hits {
                Some(hits) => {
                    oracle_matched_rows += 1;
                    for &c_idx in hits {
                        joins.entry(c_idx).or_default().push((
                            mi_idx,
                            MatchSource::Oracle {
                                original_name: name.clone(),
                            },
                        ));
                    }
                }
                None => unmatched.push((
                    mi_idx,
                    UnmatchedReason::NoContractForMatch,
                    Some(decision.clone()),
                )),
            }
        }

        let mut rows = Vec::new();
        for (c_idx, keyed) in self.contracts.iter().enumerate() {
            match joins.get(&c_idx) {
                Some(spend_rows) => {
                    for (mi_idx, source) in spend_rows {
                        rows.push(ReconciledRow {
                            contract: keyed.contract.clone(),
                            supplier_key: keyed.supplier_key.clone(),
                            spend: Some(self.mi[*mi_idx].record.clone()),
                            source: Some(source.clone()),
                        });
                    }
                }
                None => rows.push(ReconciledRow {
                    contract: keyed.contract.clone(),
                    supplier_key: keyed.supplier_key.clone(),
                    spend: None,
                    source: None,
                }),
            }
        }

        unmatched.sort_by_key(|(mi_idx, _, _)| *mi_idx);
        let unmatched: Vec<UnmatchedRow> = unmatched
            .into_iter()
            .map(|(mi_idx, reason, decision)| UnmatchedRow {
                record: self.mi[mi_idx].record.clone(),
                reason,
                decision,
            })
            .collect();

        let residual_names = self.residual_names();
        let mut exact_rows: Vec<usize> = self.exact.iter().map(|(m, _)| *m).collect();
        exact_rows.dedup();
        let stats = ReconcileStats {
            keyed_contracts: self.contracts.len(),
            total_mi_rows: self.mi.len(),
            candidate_pool_size: self.pool.len(),
            exact_matched_rows: exact_rows.len(),
            exempt_rows: self.exempt.len(),
            missing_key_rows: self.missing_key.len(),
            residual_rows: self.residual.len(),
            unique_residual_names: residual_names.len(),
            oracle_matches_accepted: residual_names
                .iter()
                .filter(|name| decisions.get(*name).map_or(false, |d| d.is_match()))
                .count(),
            oracle_matched_rows,
            final_unmatched_rows: unmatched.len(),
            ..Default::default()
        };

        Reconciliation {
            rows,
            unmatched,
            stats,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub rows: Vec<ReconciledRow>,
    pub unmatched: Vec<UnmatchedRow>,
    pub stats: ReconcileStats,
}

/// Resolves each name one at a time against the pool. HTTP-adapter errors
/// stop the run.
pub async fn resolve_residuals(
    oracle: &dyn MatchOracle,
    names: &[String],
    pool: &CandidatePool,
    progress: &ProgressConfig,
) -> Result<HashMap<String, MatchDecision>, OracleError> {
    let logger = StageLogger::new(Stage::Oracle);
    logger.log_start(
        oracle.kind().as_str(),
        &format!("{} names against {} candidates", names.len(), pool.len()),
    );
    let pb = progress.create_bar(names.len() as u64, "Resolving residual names");

    let mut decisions = HashMap::with_capacity(names.len());
    for (idx, name) in names.iter().enumerate() {
        let candidates = pool.candidates_for(name);
        let decision = resolve_and_validate(oracle, name, &candidates).await?;
        decisions.insert(name.clone(), decision);
        logger.log_names_processed(idx + 1, names.len());
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = pb {
        pb.finish_with_message("Residual names resolved");
    }

    let accepted = decisions.values().filter(|d| d.is_match()).count();
    logger.log_completion(&format!("{} / {} names matched", accepted, names.len()));
    Ok(decisions)
}

/// Produces a decision for every residual name, either one oracle call
/// at a time or through the batch dispatcher.
#[async_trait]
pub trait ResidualResolver: Send + Sync {
    fn label(&self) -> &'static str;

    async fn resolve_names(
        &self,
        names: &[String],
        pool: &CandidatePool,
        progress: &ProgressConfig,
    ) -> Result<HashMap<String, MatchDecision>, OracleError>;
}

#[async_trait]
impl<'o> ResidualResolver for &'o dyn MatchOracle {
    fn label(&self) -> &'static str {
        self.kind().as_str()
    }

    async fn resolve_names(
        &self,
        names: &[String],
        pool: &CandidatePool,
        progress: &ProgressConfig,
    ) -> Result<HashMap<String, MatchDecision>, OracleError> {
        resolve_residuals(*self, names, pool, progress).await
    }
}

#[async_trait]
impl ResidualResolver for Box<dyn MatchOracle> {
    fn label(&self) -> &'static str {
        self.kind().as_str()
    }

    async fn resolve_names(
        &self,
        names: &[String],
        pool: &CandidatePool,
        progress: &ProgressConfig,
    ) -> Result<HashMap<String, MatchDecision>, OracleError> {
        resolve_residuals(self.as_ref(), names, pool, progress).await
    }
}

/// Whole pipeline in one call. `oracle = None` runs the exact join only.
pub async fn reconcile(
    contracts: &[ContractRecord],
    mi: &[MiRecord],
    bridge: &[RegistrationKeyPair],
    oracle: Option<&dyn MatchOracle>,
    progress: &ProgressConfig,
) -> anyhow::Result<Reconciliation> {
    match oracle {
        Some(oracle) => reconcile_with(contracts, mi, bridge, Some(&oracle), progress).await,
        None => reconcile_with(contracts, mi, bridge, None, progress).await,
    }
}

/// Exact join, residual resolution and second pass. `resolver = None`
/// runs the exact join only.
pub async fn reconcile_with(
    contracts: &[ContractRecord],
    mi: &[MiRecord],
    bridge: &[RegistrationKeyPair],
    resolver: Option<&dyn ResidualResolver>,
    progress: &ProgressConfig,
) -> anyhow::Result<Reconciliation> {
    let join_logger = StageLogger::new(Stage::Join);
    let join_start = Instant::now();
    let keyed_contracts = attach_supplier_keys(contracts, bridge)?;
    let keyed_mi = key_mi_records(mi)?;
    join_logger.log_phase(
        "Exact join",
        Some(&format!(
            "{} of {} contracts carry a supplier key, {} MI rows",
            keyed_contracts.len(),
            contracts.len(),
            keyed_mi.len()
        )),
    );
    let first = FirstPass::run(keyed_contracts, keyed_mi);
    let join_time = join_start.elapsed().as_secs_f64();

    let oracle_start = Instant::now();
    let names = first.residual_names();
    let decisions = match resolver {
        Some(resolver) if !names.is_empty() => {
            resolver.resolve_names(&names, first.pool(), progress).await?
        }
        _ => HashMap::new(),
    };
    let oracle_time = oracle_start.elapsed().as_secs_f64();

    let mut result = first.finish(&decisions);
    result.stats.total_contracts = contracts.len();
    result.stats.join_time = join_time;
    result.stats.oracle_time = oracle_time;
    Ok(result)
}
