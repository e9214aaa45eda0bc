use super::*;

fn sample_records() -> Vec<FlatRecord> {
    vec![
        FlatRecord::new(ItemKind::Id, "11.01", "Passport scan"),
        FlatRecord::new(ItemKind::Category, "11", "Documents"),
        FlatRecord::new(ItemKind::Area, "10-19", "Life admin"),
        FlatRecord::new(ItemKind::Category, "12", "Insurance"),
        FlatRecord::new(ItemKind::Id, "12.01", "Car policy"),
        FlatRecord::new(ItemKind::Area, "20-29", "Work"),
    ]
}

#[test]
fn builds_single_chain_and_keeps_the_id_title() {
    let records = vec![
        FlatRecord::new(ItemKind::Project, "001", "Home"),
        FlatRecord::new(ItemKind::Area, "00-09", "System"),
        FlatRecord::new(ItemKind::Category, "01", "Inbox"),
        FlatRecord::new(ItemKind::Id, "01.01", "Unsorted notes"),
    ];
    let system = build("001", "Home", &records);

    assert_eq!(system.projects.len(), 1);
    let id = system.id("001", "01.01").expect("id node");
    assert_eq!(id.title, "Unsorted notes");
    assert_eq!(system.id_count(), 1);
}

#[test]
fn empty_collection_yields_empty_project() {
    let system = build("007", "Empty", &[]);
    let project = system.project("007").expect("project node");
    assert_eq!(project.title, "Empty");
    assert!(project.areas.is_empty());
    assert_eq!(system.projects.keys().collect::<Vec<_>>(), vec!["007"]);
}

#[test]
fn input_order_does_not_matter() {
    let records = sample_records();
    let mut reversed = records.clone();
    reversed.reverse();

    assert_eq!(build("001", "Home", &records), build("001", "Home", &reversed));
    let system = build("001", "Home", &records);
    assert_eq!(system.category("001", "12").expect("category").title, "Insurance");
    assert_eq!(system.id("001", "12.01").expect("id").title, "Car policy");
}

#[test]
fn building_twice_is_structurally_equal() {
    let records = sample_records();
    assert_eq!(build("001", "Home", &records), build("001", "Home", &records));
}

#[test]
fn orphans_are_dropped() {
    let records = vec![
        FlatRecord::new(ItemKind::Area, "10-19", "Life admin"),
        FlatRecord::new(ItemKind::Category, "31", "No area"),
        FlatRecord::new(ItemKind::Id, "31.01", "No area either"),
        FlatRecord::new(ItemKind::Id, "15.01", "No category"),
    ];
    let system = build("001", "Home", &records);
    let project = system.project("001").expect("project");

    assert_eq!(project.areas.len(), 1);
    assert!(project.areas["10-19"].categories.is_empty());
    assert_eq!(system.id_count(), 0);
}

#[test]
fn malformed_numbers_are_dropped() {
    let records = vec![
        FlatRecord::new(ItemKind::Area, "10-29", "Bad decade"),
        FlatRecord::new(ItemKind::Area, "10-19", "Good"),
        FlatRecord::new(ItemKind::Category, "1", "Short"),
        FlatRecord::new(ItemKind::Category, "10-19", "Wrong kind"),
    ];
    let system = build("001", "Home", &records);
    let project = system.project("001").expect("project");

    assert_eq!(project.areas.keys().collect::<Vec<_>>(), vec!["10-19"]);
    assert!(project.areas["10-19"].categories.is_empty());
}

#[test]
fn project_records_do_not_add_roots() {
    let records = vec![FlatRecord::new(ItemKind::Project, "002", "Other")];
    let system = build("001", "Home", &records);
    assert_eq!(system.projects.len(), 1);
    assert!(system.project("002").is_none());
}

#[test]
fn meta_is_carried_onto_nodes() {
    let mut meta = shared::domain::Meta::new();
    meta.insert("colour".into(), serde_json::json!("teal"));
    let records =
        vec![FlatRecord::new(ItemKind::Area, "10-19", "Life admin").with_meta(meta.clone())];
    let system = build("001", "Home", &records);
    assert_eq!(system.area("001", "10-19").expect("area").meta, Some(meta));
}

#[test]
fn rebuilds_thousands_of_records() {
    let mut records = Vec::new();
    for decade in 0..10 {
        records.push(FlatRecord::new(ItemKind::Area, format!("{decade}0-{decade}9"), "area"));
        for unit in 0..10 {
            let category = format!("{decade}{unit}");
            for id in 0..50 {
                records.push(FlatRecord::new(ItemKind::Id, format!("{category}.{id:02}"), "id"));
            }
            records.push(FlatRecord::new(ItemKind::Category, category, "category"));
        }
    }

    let started = std::time::Instant::now();
    let system = build("001", "Big", &records);
    assert_eq!(system.id_count(), 5000);
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
}

#[test]
fn serializes_as_project_map() {
    let system = build("001", "Home", &[FlatRecord::new(ItemKind::Area, "10-19", "Life admin")]);
    let value = serde_json::to_value(&system).expect("json");
    assert_eq!(value["001"]["areas"]["10-19"]["title"], "Life admin");
}
