mod common;

use common::{Harness, USER_BASE_DN};
use dirsync_core::{DirectoryStore, EntryAttributes, NewGroup, RelationalStore};

#[tokio::test]
async fn test_fresh_sync_is_consistent() {
    let h = Harness::with_basic_org();
    h.engine.sync_all().await.unwrap();

    let report = h.auditor.audit().await.unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.groups_checked, 2);
    assert_eq!(report.users_checked, 1);
}

#[tokio::test]
async fn test_reports_both_directions() {
    let h = Harness::with_basic_org();
    h.engine.sync_all().await.unwrap();
    let alice = h
        .store
        .find_user_by_union_id("feishu_on_u1")
        .await
        .unwrap()
        .unwrap();

    // Row gone, entry left behind.
    h.store.delete_users(&[alice.id]).await.unwrap();
    // Entry gone, row left behind.
    h.directory
        .delete_entry("cn=Platform,cn=R&D,dc=example,dc=com")
        .await
        .unwrap();

    let report = h.auditor.audit().await.unwrap();
    assert_eq!(report.directory_only, vec![format!("uid=alice,{USER_BASE_DN}")]);
    assert_eq!(
        report.relational_only,
        vec!["cn=Platform,cn=R&D,dc=example,dc=com".to_string()]
    );
    assert!(!report.is_consistent());
}

#[tokio::test]
async fn test_entries_of_other_sources_are_not_flagged() {
    let h = Harness::with_basic_org();
    h.engine.sync_all().await.unwrap();

    let dn = "cn=Ops,dc=example,dc=com";
    h.directory
        .create_entry(
            dn,
            &EntryAttributes::new()
                .with_values("objectClass", ["top", "groupOfUniqueNames"])
                .with("cn", "Ops"),
        )
        .await
        .unwrap();
    h.store
        .create_group(&NewGroup {
            source_dept_id: "dingtalk_7".into(),
            source_dept_parent_id: "dingtalk_0".into(),
            parent_id: None,
            group_name: "Ops".into(),
            remark: "Ops".into(),
            source: "dingtalk".into(),
            group_dn: dn.into(),
            group_type: "cn".into(),
            creator: "system".into(),
        })
        .await
        .unwrap();

    assert!(h.auditor.audit().await.unwrap().is_consistent());
}
