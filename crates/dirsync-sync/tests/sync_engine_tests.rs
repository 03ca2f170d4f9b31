//! End-to-end sync runs against the in-memory stores.

mod common;

use common::{dept, user, Harness, BASE_DN, USER_BASE_DN};
use dirsync_core::dn::is_descendant_or_self;
use dirsync_core::{
    DirectoryStore, EntryAttributes, RelationalStore, SyncError, SyncPhase, TreeError,
};

#[tokio::test]
async fn test_basic_org_lands_in_both_stores() {
    let h = Harness::with_basic_org();

    let report = h.engine.sync_all().await.unwrap();
    assert_eq!(report.departments.created, 2);
    assert_eq!(report.users.created, 1);
    assert!(report.users.is_clean());

    let d1 = h
        .store
        .find_group_by_source_dept_id("feishu_d1")
        .await
        .unwrap()
        .unwrap();
    let d2 = h
        .store
        .find_group_by_source_dept_id("feishu_d2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(d1.parent_id, None);
    assert_eq!(d1.source_dept_parent_id, "feishu_0");
    assert_eq!(d1.group_dn, "cn=R&D,dc=example,dc=com");
    assert_eq!(d2.parent_id, Some(d1.id));
    assert_eq!(d2.group_dn, "cn=Platform,cn=R&D,dc=example,dc=com");
    assert_eq!(d2.group_type, "cn");
    assert_eq!(d2.creator, "system");

    let alice = h
        .store
        .find_user_by_union_id("feishu_on_u1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice.departments, "Platform");
    assert_eq!(alice.user_dn, format!("uid=alice,{USER_BASE_DN}"));
    assert_eq!(alice.source_user_id, "feishu_u1");
    assert!(is_descendant_or_self(&alice.user_dn, BASE_DN));
    assert!(is_descendant_or_self(&d2.group_dn, BASE_DN));
    assert_eq!(h.store.member_group_ids(alice.id).await, vec![d2.id]);
    assert_eq!(h.store.user_role_ids(alice.id).await, vec![2]);

    let attrs = h.directory.attributes(&alice.user_dn).await.unwrap();
    assert_eq!(attrs.first("mail"), Some("alice@example.com"));
    assert_eq!(attrs.first("businessCategory"), Some("Platform"));
    assert!(h
        .directory
        .members(&d2.group_dn)
        .await
        .contains(&alice.user_dn));
    assert_eq!(
        h.directory.members(&d1.group_dn).await,
        vec![common::ADMIN_DN.to_string()]
    );
}

#[tokio::test]
async fn test_second_run_writes_nothing() {
    let h = Harness::with_basic_org();

    h.engine.sync_all().await.unwrap();
    let after_first = h.writes();

    let report = h.engine.sync_all().await.unwrap();
    assert_eq!(h.writes(), after_first);
    assert_eq!(report.departments.created, 0);
    assert_eq!(report.departments.skipped, 2);
    assert_eq!(report.users.created, 0);
    assert_eq!(report.users.skipped, 1);
}

#[tokio::test]
async fn test_parents_are_created_first_for_any_input_order() {
    let listing = vec![
        dept("a", "0", "A"),
        dept("b", "a", "B"),
        dept("c", "b", "C"),
        dept("d", "a", "D"),
        dept("e", "0", "E"),
        dept("f", "e", "F"),
    ];
    let orders: Vec<Vec<usize>> = vec![
        vec![0, 1, 2, 3, 4, 5],
        vec![5, 4, 3, 2, 1, 0],
        vec![2, 5, 1, 3, 0, 4],
        vec![3, 2, 5, 4, 1, 0],
    ];

    let mut dns_per_order = Vec::new();
    for order in orders {
        let h = Harness::new();
        h.remote
            .set_departments(order.iter().map(|&i| listing[i].clone()).collect());

        let report = h.engine.sync_departments().await.unwrap();
        assert_eq!(report.created, 6);

        // Ids are handed out in creation order.
        for group in h.store.list_groups_by_source("feishu").await.unwrap() {
            if let Some(parent_id) = group.parent_id {
                assert!(parent_id < group.id, "{} created before its parent", group.group_name);
            }
        }

        let mut dns: Vec<String> = h
            .store
            .list_groups_by_source("feishu")
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.group_dn)
            .collect();
        dns.sort();
        dns_per_order.push(dns);
    }

    assert!(dns_per_order.windows(2).all(|w| w[0] == w[1]));
    assert!(dns_per_order[0].contains(&"cn=C,cn=B,cn=A,dc=example,dc=com".to_string()));
}

#[tokio::test]
async fn test_department_failure_aborts_phase_with_context() {
    let h = Harness::with_basic_org();
    h.directory.set_read_only(true);

    let err = h.engine.sync_departments().await.unwrap_err();
    assert_eq!(err.context(), Some((SyncPhase::Departments, "R&D")));
    assert_eq!(err.kind(), "operation_error");
    assert!(err.is_transient());
    assert_eq!(h.store.group_count().await, 0);

    // sync_all does not reach the user phase.
    assert!(h.engine.sync_all().await.is_err());
    assert_eq!(h.store.user_count().await, 0);
}

#[tokio::test]
async fn test_structural_errors_are_reported() {
    let h = Harness::new();
    h.remote
        .set_departments(vec![dept("d1", "0", "R&D"), dept("d2", "missing", "Lost")]);

    let err = h.engine.sync_departments().await.unwrap_err();
    match err {
        SyncError::Operation(op) => {
            assert_eq!(op.phase, SyncPhase::Departments);
            assert!(matches!(
                *op.source,
                SyncError::Tree(TreeError::OrphanRecord { ref id, .. }) if id == "feishu_d2"
            ));
        }
        other => panic!("expected operation error, got {other:?}"),
    }
    assert_eq!(h.writes(), (0, 0));

    h.remote.set_departments(vec![dept("d1", "0", "")]);
    let err = h.engine.sync_departments().await.unwrap_err();
    assert!(err.to_string().contains("`name`"));
}

#[tokio::test]
async fn test_remote_outage_fails_phase() {
    let h = Harness::with_basic_org();
    h.remote.set_unavailable(true);

    let err = h.engine.sync_users().await.unwrap_err();
    assert_eq!(err.context(), Some((SyncPhase::Users, "remote listing")));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_user_failures_are_collected() {
    let h = Harness::with_basic_org();
    let mut nameless = user("u3", "", &["d2"]);
    nameless.username = "  ".into();
    h.remote.set_users(vec![
        user("u1", "alice", &["d2"]),
        user("u2", "bob", &["d9"]),
        nameless,
        user("u4", "carol", &["d1", "d2"]),
    ]);

    let report = h.engine.sync_all().await.unwrap();
    let users = report.users;
    assert_eq!(users.total, 4);
    assert_eq!(users.created, 2);
    assert_eq!(users.failures.len(), 2);

    assert_eq!(users.failures[0].username, "bob");
    assert_eq!(users.failures[0].kind, "operation_error");
    assert!(users.failures[0].error.contains("feishu_d9"));
    assert_eq!(users.failures[1].username, "u3");
    assert!(users.failures[1].error.contains("`username`"));

    let carol = h
        .store
        .find_user_by_union_id("feishu_on_u4")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(carol.departments, "R&D,Platform");
}

#[tokio::test]
async fn test_users_in_root_department_are_synced() {
    let h = Harness::new();
    h.remote.set_departments(vec![dept("d1", "0", "R&D")]);
    h.remote.set_users(vec![
        user("u1", "bob", &["0"]),
        user("u2", "carol", &["0", "d1"]),
    ]);

    let report = h.engine.sync_all().await.unwrap();
    assert_eq!(report.users.created, 2);
    assert!(report.users.is_clean());

    let d1 = h
        .store
        .find_group_by_source_dept_id("feishu_d1")
        .await
        .unwrap()
        .unwrap();

    let bob = h
        .store
        .find_user_by_union_id("feishu_on_u1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bob.departments, "");
    assert!(h.store.member_group_ids(bob.id).await.is_empty());
    let attrs = h.directory.attributes(&bob.user_dn).await.unwrap();
    assert_eq!(attrs.first("businessCategory"), None);

    let carol = h
        .store
        .find_user_by_union_id("feishu_on_u2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(carol.departments, "R&D");
    assert_eq!(h.store.member_group_ids(carol.id).await, vec![d1.id]);
    assert!(h
        .directory
        .members(&d1.group_dn)
        .await
        .contains(&carol.user_dn));
    assert!(!h
        .directory
        .members(&d1.group_dn)
        .await
        .contains(&bob.user_dn));

    let report = h.engine.sync_all().await.unwrap();
    assert_eq!(report.users.created, 0);
    assert_eq!(report.users.skipped, 2);
}

#[tokio::test]
async fn test_half_finished_group_is_adopted() {
    let h = Harness::with_basic_org();

    // A previous run died after the directory write.
    h.directory
        .create_entry(
            "cn=R&D,dc=example,dc=com",
            &EntryAttributes::new()
                .with_values("objectClass", ["top", "groupOfUniqueNames"])
                .with("cn", "R&D"),
        )
        .await
        .unwrap();
    let audit = h.auditor.audit().await.unwrap();
    assert_eq!(audit.directory_only, vec!["cn=R&D,dc=example,dc=com".to_string()]);

    let report = h.engine.sync_departments().await.unwrap();
    assert_eq!(report.created, 2);
    assert!(h
        .store
        .group_exists_by_dn("cn=R&D,dc=example,dc=com")
        .await
        .unwrap());
    assert!(h.auditor.audit().await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_half_finished_user_heals_on_next_run() {
    let h = Harness::with_basic_org();
    h.engine.sync_departments().await.unwrap();

    h.store.set_read_only(true);
    let report = h.engine.sync_users().await.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, "operation_error");
    assert!(h
        .directory
        .entry_exists(&format!("uid=alice,{USER_BASE_DN}"))
        .await
        .unwrap());

    let audit = h.auditor.audit().await.unwrap();
    assert_eq!(audit.directory_only, vec![format!("uid=alice,{USER_BASE_DN}")]);

    h.store.set_read_only(false);
    let report = h.engine.sync_users().await.unwrap();
    assert_eq!(report.created, 1);
    assert!(h.auditor.audit().await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_renamed_department_is_not_recreated() {
    let h = Harness::with_basic_org();
    h.engine.sync_departments().await.unwrap();
    let before = h.writes();

    h.remote.set_departments(vec![
        dept("d1", "0", "Research"),
        dept("d2", "d1", "Platform"),
    ]);
    let report = h.engine.sync_departments().await.unwrap();

    assert_eq!(report.created, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(h.writes(), before);
}

#[tokio::test]
async fn test_dn_values_are_escaped() {
    let h = Harness::new();
    h.remote
        .set_departments(vec![dept("d1", "0", "Sales, East"), dept("d2", "d1", "#1 Team")]);

    h.engine.sync_departments().await.unwrap();

    let d2 = h
        .store
        .find_group_by_source_dept_id("feishu_d2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(d2.group_dn, r"cn=\231 Team,cn=Sales\, East,dc=example,dc=com");
    assert!(h.directory.entry_exists(&d2.group_dn).await.unwrap());
}
