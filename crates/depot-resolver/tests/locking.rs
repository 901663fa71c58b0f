use depot_core::config::{ResolverConfig, UpdateLevel};
use depot_core::{Candidate, Dependency, LockedCandidates, Unlock, Version};
use depot_resolver::{PackageIndex, Resolution, Resolver, VersionPromoter};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn candidate(name: &str, version: &str) -> Candidate {
    Candidate::new(name, Version::parse(version).unwrap())
}

fn dep(name: &str, constraint: &str) -> Dependency {
    Dependency::parse(name, constraint).unwrap()
}

fn universe() -> PackageIndex {
    publish(PackageIndex::new())
}

fn publish(index: PackageIndex) -> PackageIndex {
    index
        .with_candidate(candidate("A", "1.0").depends_on(dep("B", ">= 1.0")))
        .with_candidate(candidate("B", "1.0"))
        .with_candidate(candidate("B", "1.1"))
        .with_candidate(candidate("B", "1.2.5"))
        .with_candidate(candidate("B", "2.0"))
        .with_candidate(candidate("B", "3.0.beta1"))
}

fn versions(resolution: &Resolution) -> Vec<String> {
    resolution
        .candidates()
        .iter()
        .map(|(key, c)| format!("{} {}", key.name, c.version))
        .collect()
}

#[test]
fn locked_version_is_kept() {
    let locked: LockedCandidates = [candidate("B", "1.0")].into_iter().collect();
    let index = universe().with_lock(locked, Unlock::None);

    let resolution = Resolver::new(&index).resolve(&[dep("A", ">= 0")]).unwrap();
    assert_eq!(versions(&resolution), vec!["B 1.0", "A 1.0"]);
}

#[test]
fn full_lock_round_trips_unchanged() {
    let first = Resolver::new(universe()).resolve(&[dep("A", ">= 0")]).unwrap();
    let locked: LockedCandidates = first.iter().map(|(_, c)| c.clone()).collect();

    let index = universe()
        .with_candidate(candidate("B", "2.5"))
        .with_lock(locked, Unlock::None);
    let second = Resolver::new(&index).resolve(&[dep("A", ">= 0")]).unwrap();
    assert_eq!(versions(&first), versions(&second));
}

#[test]
fn unlocked_name_moves_to_newest() {
    let locked: LockedCandidates = [candidate("A", "1.0"), candidate("B", "1.0")]
        .into_iter()
        .collect();
    let index = universe().with_lock(locked, Unlock::names(["B"]));

    let resolution = Resolver::new(&index).resolve(&[dep("A", ">= 0")]).unwrap();
    assert_eq!(resolution.get_named("B").unwrap().version.to_string(), "2.0");
}

#[test]
fn lock_that_no_longer_fits_fails_without_unlock() {
    let locked: LockedCandidates = [candidate("B", "1.0")].into_iter().collect();
    let index = universe().with_lock(locked, Unlock::None);

    let err = Resolver::new(&index).resolve(&[dep("B", ">= 2")]).unwrap_err();
    assert!(err.conflicts().is_some());

    let locked: LockedCandidates = [candidate("B", "1.0")].into_iter().collect();
    let index = universe().with_lock(locked, Unlock::All);
    let resolution = Resolver::new(&index).resolve(&[dep("B", ">= 2")]).unwrap();
    assert_eq!(resolution.get_named("B").unwrap().version.to_string(), "2.0");
}

#[rstest]
#[case::major(UpdateLevel::Major, false, "2.0")]
#[case::minor(UpdateLevel::Minor, false, "1.2.5")]
#[case::minor_conservative(UpdateLevel::Minor, true, "1.1")]
#[case::patch(UpdateLevel::Patch, false, "1.1")]
fn update_level_bounds_the_move(
    #[case] level: UpdateLevel,
    #[case] conservative: bool,
    #[case] expected: &str,
) {
    let locked: LockedCandidates = [candidate("B", "1.1")].into_iter().collect();
    let index = universe()
        .with_policy(VersionPromoter::new(level).conservative(conservative))
        .with_lock(locked, Unlock::All);

    let resolution = Resolver::new(&index).resolve(&[dep("A", ">= 0")]).unwrap();
    assert_eq!(resolution.get_named("B").unwrap().version.to_string(), expected);
}

#[test]
fn prerelease_only_when_asked_for() {
    let resolution = Resolver::new(universe()).resolve(&[dep("B", ">= 0")]).unwrap();
    assert_eq!(resolution.get_named("B").unwrap().version.to_string(), "2.0");

    let resolution = Resolver::new(universe())
        .resolve(&[dep("B", ">= 3.0.a")])
        .unwrap();
    assert_eq!(resolution.get_named("B").unwrap().version.to_string(), "3.0.beta1");
}

#[test]
fn strict_patch_policy_still_leaves_the_level_when_required() {
    let locked: LockedCandidates = [candidate("B", "1.1")].into_iter().collect();
    let index = universe()
        .with_policy(VersionPromoter::new(UpdateLevel::Patch).strict(true))
        .with_lock(locked, Unlock::All);

    let resolution = Resolver::new(&index).resolve(&[dep("B", ">= 2.0")]).unwrap();
    assert_eq!(resolution.get_named("B").unwrap().version.to_string(), "2.0");
}

#[test]
fn prerelease_opt_in_reaches_the_resolver() {
    let index = universe().with_policy(VersionPromoter::default().allow_prerelease("B"));
    let resolution = Resolver::new(&index).resolve(&[dep("A", ">= 0")]).unwrap();
    assert_eq!(resolution.get_named("B").unwrap().version.to_string(), "3.0.beta1");

    // other names stay on releases
    let index = universe().with_policy(VersionPromoter::default().allow_prerelease("A"));
    let resolution = Resolver::new(&index).resolve(&[dep("A", ">= 0")]).unwrap();
    assert_eq!(resolution.get_named("B").unwrap().version.to_string(), "2.0");
}

#[test]
fn prerelease_opt_in_from_config() {
    let config = ResolverConfig::parse_toml("[policy]\nprerelease = [\"B\"]\n").unwrap();
    let index = publish(PackageIndex::from_config(&config));

    let resolution = Resolver::new(&index).resolve(&[dep("B", ">= 0")]).unwrap();
    assert_eq!(resolution.get_named("B").unwrap().version.to_string(), "3.0.beta1");
}

#[test]
fn locked_prerelease_is_kept() {
    let locked: LockedCandidates = [candidate("B", "3.0.beta1")].into_iter().collect();
    let index = universe().with_lock(locked, Unlock::None);

    let resolution = Resolver::new(&index).resolve(&[dep("A", ">= 0")]).unwrap();
    assert_eq!(resolution.get_named("B").unwrap().version.to_string(), "3.0.beta1");
}
