use depot_core::{Candidate, LockedCandidates, PackageName, Platform, ResolutionKey, Unlock, Version};

fn candidate(name: &str, version: &str) -> Candidate {
    Candidate::new(name, Version::parse(version).unwrap())
}

#[test]
fn lookup_falls_back_to_platform_independent_lock() {
    let locked: LockedCandidates = [candidate("rack", "3.0.8")].into_iter().collect();
    let key = ResolutionKey::new("rack", Platform::new("x86_64-linux"));
    assert_eq!(
        locked.get(&key).map(|c| c.version.to_string()),
        Some("3.0.8".to_string())
    );
}

#[test]
fn platform_specific_lock_wins() {
    let mut locked = LockedCandidates::new();
    locked.insert(Platform::any(), candidate("nokogiri", "1.15.0"));
    locked.insert(
        Platform::new("java"),
        candidate("nokogiri", "1.14.0").with_platform(Platform::new("java")),
    );
    let java = locked
        .get(&ResolutionKey::new("nokogiri", Platform::new("java")))
        .unwrap();
    assert_eq!(java.version, Version::parse("1.14.0").unwrap());
    assert_eq!(locked.len(), 2);
    assert!(locked.contains_name(&PackageName::new("nokogiri")));
}

#[test]
fn unlock_semantics() {
    let rack = PackageName::new("rack");
    let rails = PackageName::new("rails");
    assert!(!Unlock::None.allows(&rack));
    assert!(Unlock::All.allows(&rack));
    let some = Unlock::names(["rack"]);
    assert!(some.allows(&rack));
    assert!(!some.allows(&rails));
}

#[test]
fn empty_lock() {
    let locked = LockedCandidates::default();
    assert!(locked.is_empty());
    assert_eq!(locked.iter().count(), 0);
}
