mod common;

use std::sync::Arc;

use common::{url_of, Fixture, NESTING, OTHER};
use matryoshka::{Archive, ArchiveOptions, Error, ResourceLoader, Resolver};

fn resolver() -> Arc<Resolver> {
    Arc::new(Resolver::new(ArchiveOptions::default()))
}

/// Loader over `[OTHER, nesting]` roots, both nested in the fixture root.
fn nesting_loader(fixture: &Fixture, nesting: &str) -> (ResourceLoader, Arc<Archive>) {
    let resolver = resolver();
    let root = resolver.open_root(&fixture.path).unwrap();
    let other = root.nested_archive(OTHER).unwrap();
    let nesting = root.nested_archive(nesting).unwrap();

    let loader = ResourceLoader::new(resolver, [other.url(), nesting.url()]).unwrap();
    (loader, nesting)
}

#[test]
fn test_resource_from_archive() {
    let fixture = Fixture::new();
    let loader = ResourceLoader::new(resolver(), [fixture.url("")]).unwrap();

    let resource = loader.find_resource("d/9.dat").unwrap().unwrap();
    assert_eq!(resource.url(), fixture.url("d/9.dat"));
    assert_eq!(resource.read_to_vec().unwrap(), [9]);

    assert_eq!(loader.find_all_resources("d/9.dat").unwrap().len(), 1);
}

#[test]
fn test_root_path_from_archive() {
    let fixture = Fixture::new();
    let loader = ResourceLoader::new(resolver(), [fixture.url("")]).unwrap();

    let root = loader.find_resource("").unwrap().unwrap();
    assert!(root.is_archive());
    assert_eq!(root.url(), fixture.url(""));
    assert!(!loader.find_all_resources("").unwrap().is_empty());
}

#[test]
fn test_root_resources_skip_empty_archives() {
    let fixture = Fixture::new();
    let loader = ResourceLoader::new(
        resolver(),
        [
            fixture.url("empty.jar!/"),
            fixture.url(""),
            fixture.url("nested.jar!/"),
        ],
    )
    .unwrap();

    let urls: Vec<String> = loader
        .find_all_resources("")
        .unwrap()
        .iter()
        .map(|r| r.url())
        .collect();
    assert_eq!(urls, [fixture.url(""), fixture.url("nested.jar!/")]);
    assert_eq!(loader.find_resource("").unwrap().unwrap().url(), fixture.url(""));
}

#[test]
fn test_resolve_from_nested() {
    let fixture = Fixture::new();
    let loader = ResourceLoader::new(resolver(), [fixture.url("")]).unwrap();

    let resource = loader.find_resource("nested.jar!/3.dat").unwrap().unwrap();
    assert_eq!(resource.url(), fixture.url("") + "nested.jar!/3.dat");
    assert_eq!(resource.read_to_vec().unwrap(), [3]);
}

#[test]
fn test_nesting_nested_relative_paths() {
    let fixture = Fixture::new();
    for name in NESTING {
        let (loader, nesting) = nesting_loader(&fixture, name);

        let resource = loader.find_resource("nested.jar!/3.dat").unwrap().unwrap();
        assert_eq!(resource.url(), nesting.url() + "nested.jar!/3.dat", "{name}");
        assert_eq!(resource.read_to_vec().unwrap(), [3], "{name}");
    }
}

#[test]
fn test_nesting_nested_relative_path_with_two_spaces() {
    let fixture = Fixture::new();
    let (loader, nesting) = nesting_loader(&fixture, "nesting nested 2.jar");

    let resource = loader.find_resource("nested 2.jar!/3.dat").unwrap().unwrap();
    assert_eq!(resource.url(), nesting.url() + "nested%202.jar!/3.dat");
    assert!(nesting.url().ends_with("nesting%20nested%202.jar!/"));
    assert_eq!(resource.read_to_vec().unwrap(), [3]);
}

#[test]
fn test_encoding_of_special_characters() {
    let fixture = Fixture::new();
    let expected = [
        ("nesting nested.jar", "nesting%20nested.jar!/"),
        ("nesting$nested.jar", "nesting$nested.jar!/"),
        ("nesting+nested.jar", "nesting+nested.jar!/"),
    ];
    for (name, suffix) in expected {
        let (_loader, nesting) = nesting_loader(&fixture, name);
        assert_eq!(nesting.url(), fixture.url(suffix));
    }
}

#[test]
fn test_nesting_nested_absolute_paths() {
    let fixture = Fixture::new();
    for name in NESTING {
        let (loader, nesting) = nesting_loader(&fixture, name);
        let absolute = nesting.url() + "nested.jar!/3.dat";

        let resource = loader.find_resource(&absolute).unwrap().unwrap();
        assert_eq!(resource.url(), absolute, "{name}");
        assert_eq!(resource.read_to_vec().unwrap(), [3], "{name}");
        assert!(Arc::ptr_eq(
            resource.archive(),
            &nesting.nested_archive("nested.jar").unwrap()
        ));
    }
}

#[test]
fn test_absolute_path_with_literal_spaces() {
    let fixture = Fixture::new();
    let (loader, nesting) = nesting_loader(&fixture, "nesting nested 2.jar");
    let literal = fixture.url("nesting nested 2.jar!/nested 2.jar!/3.dat");

    let resource = loader.find_resource(&literal).unwrap().unwrap();
    assert_eq!(resource.url(), literal.replace(' ', "%20"));
    assert_eq!(resource.url(), nesting.url() + "nested%202.jar!/3.dat");
}

#[test]
fn test_first_match_wins() {
    let fixture = Fixture::new();
    let loader = ResourceLoader::new(
        resolver(),
        [
            fixture.url(&format!("{OTHER}!/")),
            fixture.url("compressed-nested.jar!/"),
            fixture.url("nested.jar!/"),
        ],
    )
    .unwrap();

    let first = loader.find_resource("3.dat").unwrap().unwrap();
    assert_eq!(first.url(), fixture.url("compressed-nested.jar!/3.dat"));

    let all: Vec<String> = loader
        .find_all_resources("3.dat")
        .unwrap()
        .iter()
        .map(|r| r.url())
        .collect();
    assert_eq!(
        all,
        [
            fixture.url("compressed-nested.jar!/3.dat"),
            fixture.url("nested.jar!/3.dat"),
        ]
    );
}

#[test]
fn test_missing_resource() {
    let fixture = Fixture::new();
    let loader = ResourceLoader::new(resolver(), [fixture.url("")]).unwrap();

    assert!(loader.find_resource("missing.dat").unwrap().is_none());
    assert!(loader.find_resource("nested.jar!/3-wrong.dat").unwrap().is_none());
    assert!(loader.find_resource(&fixture.url("w.jar!/3.dat")).unwrap().is_none());
    assert!(loader.find_all_resources("missing.dat").unwrap().is_empty());

    let elsewhere = fixture.dir.path().join("elsewhere.jar");
    let url = format!("jar:file:{}!/1.dat", elsewhere.to_string_lossy().replace('\\', "/"));
    assert!(loader.find_resource(&url).unwrap().is_none());
}

#[test]
fn test_non_archive_entry_does_not_hide_later_root() {
    let fixture = Fixture::new();
    let second = fixture.sibling("second.jar", common::shadowing_jar());
    let loader =
        ResourceLoader::new(resolver(), [fixture.url(""), url_of(&second, "")]).unwrap();

    let expected = url_of(&second, "not-an-archive.jar!/3.dat");
    let found = loader
        .find_resource("not-an-archive.jar!/3.dat")
        .unwrap()
        .unwrap();
    assert_eq!(found.url(), expected);
    assert_eq!(found.read_to_vec().unwrap(), [3]);

    let all = loader.find_all_resources("not-an-archive.jar!/3.dat").unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].url(), expected);

    // The absolute form under the first root is a miss, not an error.
    let absolute = fixture.url("not-an-archive.jar!/3.dat");
    assert!(loader.find_resource(&absolute).unwrap().is_none());
}

#[test]
fn test_malformed_name_is_an_error() {
    let fixture = Fixture::new();
    let loader = ResourceLoader::new(resolver(), [fixture.url("")]).unwrap();

    let err = loader.find_resource("nested.jar!/!/3.dat").unwrap_err();
    assert!(matches!(err, Error::MalformedAddress { .. }));
}

#[test]
fn test_roots_must_be_archives() {
    let fixture = Fixture::new();

    let entry_root = ResourceLoader::new(resolver(), [fixture.url("1.dat")]).unwrap_err();
    assert!(matches!(entry_root, Error::MalformedAddress { .. }));

    let relative_root = ResourceLoader::new(resolver(), ["nested.jar!/"]).unwrap_err();
    assert!(matches!(relative_root, Error::MalformedAddress { .. }));
}

#[test]
fn test_from_archives() {
    let fixture = Fixture::new();
    let root = Archive::open(&fixture.path).unwrap();
    let nested = root.nested_archive("nested.jar").unwrap();

    let resolver = resolver();
    let loader = ResourceLoader::from_archives(Arc::clone(&resolver), vec![nested, Arc::clone(&root)]);
    assert_eq!(resolver.root_count(), 1);
    assert!(Arc::ptr_eq(&resolver.open_root(&fixture.path).unwrap(), &root));

    let found = loader.find_resource("1.dat").unwrap().unwrap();
    assert!(Arc::ptr_eq(found.archive(), &root));
    assert_eq!(loader.find_resource("3.dat").unwrap().unwrap().url(), fixture.url("nested.jar!/3.dat"));
}
