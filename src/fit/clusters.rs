//! Independent-cluster decomposition.
//!
//! Profiles that share no free parameter can be minimized separately. When,
//! say, `pb` and `kex` are fixed, a multi-residue fit usually falls apart into
//! one cluster per residue.
//!
//! The construction is streaming: each profile joins the first cluster whose
//! free names it intersects, or starts a new one. Clusters already in the list
//! are never merged with each other afterwards.

use std::collections::BTreeSet;

use crate::data::{Dataset, Profile};
use crate::error::AppError;
use crate::params::{ParameterName, ParameterSet};

/// One independently minimizable sub-problem.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Components shared by every free parameter of the cluster.
    pub label: ParameterName,
    pub data: Dataset,
    pub params: ParameterSet,
    pub free: BTreeSet<String>,
}

struct Building {
    profiles: Vec<Profile>,
    names: Vec<String>,
    free: BTreeSet<String>,
}

/// Free parameters a profile depends on, directly or through expressions.
pub fn profile_free_names(profile: &Profile, params: &ParameterSet) -> Result<BTreeSet<String>, AppError> {
    let mut out = BTreeSet::new();
    for name in profile.param_names() {
        out.extend(params.free_dependencies(&name)?);
    }
    Ok(out)
}

/// Partition `data` into clusters connected by shared free parameters,
/// sorted by label.
pub fn find_independent_clusters(data: &Dataset, params: &ParameterSet) -> Result<Vec<Cluster>, AppError> {
    let mut building: Vec<Building> = Vec::new();

    for profile in data.profiles() {
        let names = profile.param_names();
        let free = profile_free_names(profile, params)?;

        match building.iter_mut().find(|c| !c.free.is_disjoint(&free)) {
            Some(cluster) => {
                cluster.profiles.push(profile.clone());
                for name in names {
                    if !cluster.names.contains(&name) {
                        cluster.names.push(name);
                    }
                }
                cluster.free.extend(free);
            }
            None => building.push(Building {
                profiles: vec![profile.clone()],
                names,
                free,
            }),
        }
    }

    let mut clusters = building
        .into_iter()
        .map(|c| {
            let label = cluster_label(&c.free)?;
            let params = params.stage(&c.names, &c.free)?.finalize()?;
            Ok(Cluster {
                label,
                data: Dataset::new(c.profiles),
                params,
                free: c.free,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    clusters.sort_by(|a, b| a.label.cmp(&b.label));
    Ok(clusters)
}

fn cluster_label(free: &BTreeSet<String>) -> Result<ParameterName, AppError> {
    let mut names = free.iter().map(|n| ParameterName::from_full_name(n));
    let Some(first) = names.next() else {
        return Ok(ParameterName::default());
    };
    names.try_fold(first?, |acc, n| Ok(acc.intersection(&n?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ExperimentContext, MeasurementRecord};
    use crate::domain::{CpmgVariant, ExperimentSettings};
    use crate::params::{Directive, Status, apply_directives};

    fn profile(peak: &str, temperature: f64) -> Profile {
        let context = ExperimentContext {
            name: format!("cpmg_{temperature}"),
            variant: CpmgVariant::NIp,
            settings: ExperimentSettings {
                h_larmor_frq: Some(600.0),
                temperature: Some(temperature),
                time_t2: Some(0.04),
                pw: Some(35e-6),
                carrier: Some(118.0),
                ..Default::default()
            },
        };
        Profile::new(
            &context,
            MeasurementRecord {
                peak: peak.to_string(),
                ncycs: vec![0, 2, 4],
                intensities: vec![1.0, 0.7, 0.75],
                errors: vec![0.01; 3],
            },
        )
        .unwrap()
    }

    fn setup(profiles: Vec<Profile>) -> (Dataset, ParameterSet) {
        let data = Dataset::new(profiles);
        let mut params = ParameterSet::new();
        data.register_parameters(&mut params);
        (data, params)
    }

    #[test]
    fn shared_free_parameter_joins_profiles() {
        let (data, params) = setup(vec![profile("G23N-H", 25.0), profile("A24N-H", 25.0)]);
        let clusters = find_independent_clusters(&data, &params).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].data.len(), 2);
        assert!(clusters[0].free.contains("kex__t25.0"));
        // dw__* carries no temperature and kex__* no nucleus.
        assert!(clusters[0].label.is_empty());
    }

    #[test]
    fn shared_fixed_parameters_do_not_join_profiles() {
        let (data, mut params) = setup(vec![profile("G23N-H", 25.0), profile("A24N-H", 25.0)]);
        apply_directives(
            &mut params,
            &[Directive::new("pb", Status::Fix), Directive::new("kex", Status::Fix)],
        )
        .unwrap();
        let clusters = find_independent_clusters(&data, &params).unwrap();
        assert_eq!(clusters.len(), 2);
        // Sorted by label: A24N before G23N.
        assert_eq!(clusters[0].label.nuclei.as_deref(), Some("a24n"));
        assert_eq!(clusters[1].label.nuclei.as_deref(), Some("g23n"));
        assert!(clusters[0].params.contains("kex__t25.0"));
        assert!(!clusters[0].params.get("kex__t25.0").unwrap().vary);
    }

    #[test]
    fn expression_links_join_profiles() {
        let (data, mut params) = setup(vec![profile("G23N-H", 25.0), profile("A24N-H", 25.0)]);
        apply_directives(
            &mut params,
            &[
                Directive::new("pb", Status::Fix),
                Directive::new("kex", Status::Fix),
                Directive::new("r_nxy__a24n*", Status::parse("r_nxy__g23n__b600.0__t25.0")),
            ],
        )
        .unwrap();
        let clusters = find_independent_clusters(&data, &params).unwrap();
        assert_eq!(clusters.len(), 1);
    }

    #[test]
    fn bridging_profile_joins_only_the_first_cluster() {
        let (data, mut params) = setup(vec![
            profile("G23N-H", 25.0),
            profile("A24N-H", 25.0),
            profile("L25N-H", 25.0),
        ]);
        apply_directives(
            &mut params,
            &[
                Directive::new("pb", Status::Fix),
                Directive::new("kex", Status::Fix),
                Directive::new("dw", Status::Fix),
                Directive::new(
                    "r_nxy__l25n*",
                    Status::parse("r_nxy__g23n__b600.0__t25.0 + r_nxy__a24n__b600.0__t25.0"),
                ),
            ],
        )
        .unwrap();
        let clusters = find_independent_clusters(&data, &params).unwrap();
        assert_eq!(clusters.len(), 2);

        let peaks = |c: &Cluster| -> Vec<String> { c.data.profiles().iter().map(|p| p.name()).collect() };
        let joined = clusters.iter().find(|c| c.data.len() == 2).unwrap();
        let alone = clusters.iter().find(|c| c.data.len() == 1).unwrap();
        assert_eq!(peaks(joined), ["G23N-H", "L25N-H"]);
        assert_eq!(peaks(alone), ["A24N-H"]);
        assert!(joined.free.contains("r_nxy__a24n__b600.0__t25.0"));
        assert!(alone.free.contains("r_nxy__a24n__b600.0__t25.0"));
    }

    #[test]
    fn partition_is_idempotent() {
        let (data, mut params) = setup(vec![
            profile("G23N-H", 25.0),
            profile("A24N-H", 25.0),
            profile("G23N-H", 30.0),
            profile("L25N-H", 30.0),
        ]);
        apply_directives(&mut params, &[Directive::new("dw", Status::Fix)]).unwrap();
        let clusters = find_independent_clusters(&data, &params).unwrap();
        assert_eq!(clusters.len(), 2);

        for cluster in &clusters {
            let again = find_independent_clusters(&cluster.data, &cluster.params).unwrap();
            assert_eq!(again.len(), 1);
            assert_eq!(again[0].label, cluster.label);
            assert_eq!(again[0].free, cluster.free);
            assert_eq!(again[0].data.len(), cluster.data.len());
        }
    }

    #[test]
    fn profiles_without_free_parameters_stay_alone() {
        let (data, mut params) = setup(vec![profile("G23N-H", 25.0), profile("A24N-H", 25.0)]);
        apply_directives(&mut params, &[Directive::new("*", Status::Fix)]).unwrap();
        let clusters = find_independent_clusters(&data, &params).unwrap();
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.label.is_empty()));
    }
}
