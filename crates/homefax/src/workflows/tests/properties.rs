use super::common::*;

use crate::workflows::domain::{
    AccessRequestStatus, AccessRequestType, Principal, PropertyDraft, PropertyStatus,
    StructuralFacts, UtilityKind,
};
use crate::workflows::error::InvariantViolation;
use crate::workflows::permissions::DenialReason;
use crate::workflows::store::PlatformStore;
use crate::workflows::{AccessRequestDraft, MaintenanceTaskDraft, PropertyView, WorkflowError};

fn roll_record(address: &str, owner: &str) -> PropertyDraft {
    PropertyDraft {
        address: address.to_string(),
        city: "Salem".to_string(),
        state: "OR".to_string(),
        zip_code: "97301".to_string(),
        facts: StructuralFacts {
            year_built: Some(1948),
            zoning: Some("RS".to_string()),
            square_feet: Some(1210),
        },
        owner_of_record: Some(owner.to_string()),
        utilities: vec![UtilityKind::Water, UtilityKind::Sewer, UtilityKind::Water],
        assessed_value: Some(298_000),
        financials_public: false,
    }
}

#[test]
fn public_view_hides_owner_and_private_financials() {
    let harness = Harness::new();
    let owner = harness.owner("Olive Owner");
    let stranger = harness.contractor("Sid Stranger");
    let property = harness.property(Some(&owner), &[UtilityKind::Gas]);
    let properties = harness.platform.properties();

    let PropertyView::Public(public) = properties
        .view(Principal::Public, property.id)
        .expect("public view")
    else {
        panic!("anonymous visitors get the public projection");
    };
    assert_eq!(public.address, property.address);
    assert_eq!(public.assessed_value, None);

    let json = serde_json::to_value(PropertyView::Public(public)).expect("serializes");
    assert_eq!(json["visibility"], "public");
    assert!(json.get("owner_id").is_none());
    assert!(json.get("owner_of_record").is_none());
    assert!(json.get("assessed_value").is_none());

    assert!(matches!(
        properties.view((&stranger).into(), property.id).expect("view"),
        PropertyView::Public(_)
    ));
    assert!(matches!(
        properties.view((&owner).into(), property.id).expect("view"),
        PropertyView::Full(_)
    ));

    harness.grant(&stranger, &property);
    assert!(matches!(
        properties.view((&stranger).into(), property.id).expect("view"),
        PropertyView::Full(_)
    ));
}

#[test]
fn public_financials_are_shown_when_owner_opts_in() {
    let harness = Harness::new();
    let owner = harness.owner("Olive Owner");
    let property = harness.property(Some(&owner), &[]);
    harness
        .store
        .transaction(|tables| {
            tables.property_mut(property.id)?.financials_public = true;
            Ok::<_, WorkflowError>(())
        })
        .expect("opted in");

    match harness
        .platform
        .properties()
        .view(Principal::Public, property.id)
        .expect("view")
    {
        PropertyView::Public(public) => assert_eq!(public.assessed_value, Some(385_000)),
        other => panic!("expected public view, got {other:?}"),
    }
}

#[test]
fn comprehensive_record_requires_full_rights() {
    let harness = Harness::new();
    let owner = harness.owner("Olive Owner");
    let builder = harness.contractor("Cal Contractor");
    let admin = harness.admin("Ada Admin", false);
    let property = harness.property(Some(&owner), &[]);
    let platform = &harness.platform;

    platform
        .maintenance()
        .add_task(
            &owner,
            property.id,
            MaintenanceTaskDraft {
                title: "Clean gutters".to_string(),
                frequency_months: Some(6),
                owner_editable: true,
            },
        )
        .expect("task added");
    platform
        .access()
        .create(
            (&builder).into(),
            AccessRequestDraft {
                property_id: property.id,
                contractor_id: None,
                owner_id: None,
                admin_id: None,
                request_type: AccessRequestType::ContractorAccess,
            },
        )
        .expect("request filed");

    let record = platform
        .properties()
        .comprehensive((&owner).into(), property.id)
        .expect("owner reads record");
    assert_eq!(record.owner.as_ref().map(|summary| summary.id), Some(owner.id));
    assert_eq!(record.maintenance_tasks.len(), 1);
    assert_eq!(record.access_requests.len(), 1);
    assert_eq!(record.access_requests[0].status, AccessRequestStatus::Pending);
    assert!(record.projects.is_empty());

    platform
        .properties()
        .comprehensive((&admin).into(), property.id)
        .expect("administrator reads record");
    assert!(matches!(
        platform.properties().comprehensive((&builder).into(), property.id),
        Err(WorkflowError::NotAuthorized(DenialReason::NotPropertyOwner))
    ));
    assert!(matches!(
        platform.properties().comprehensive(Principal::Public, property.id),
        Err(WorkflowError::NotAuthorized(DenialReason::AuthenticationRequired))
    ));
}

#[test]
fn administrator_assigns_owner_to_unclaimed_property() {
    let harness = Harness::new();
    let admin = harness.admin("Ada Admin", false);
    let owner = harness.owner("Olive Owner");
    let builder = harness.contractor("Cal Contractor");
    let unclaimed = harness.property(None, &[]);
    let properties = harness.platform.properties();

    assert!(matches!(
        properties.assign_owner(&owner, unclaimed.id, owner.id),
        Err(WorkflowError::NotAuthorized(_))
    ));
    assert!(matches!(
        properties.assign_owner(&admin, unclaimed.id, builder.id),
        Err(WorkflowError::Validation(_))
    ));

    let assigned = properties
        .assign_owner(&admin, unclaimed.id, owner.id)
        .expect("assigned");
    assert_eq!(assigned.owner_id, Some(owner.id));

    match properties.assign_owner(&admin, unclaimed.id, owner.id) {
        Err(WorkflowError::InvalidState(InvariantViolation::OwnershipAlreadyAssigned)) => {}
        other => panic!("expected already assigned, got {other:?}"),
    }
}

#[test]
fn roll_import_skips_records_already_on_file() {
    let harness = Harness::new();
    let admin = harness.admin("Ada Admin", false);
    let owner = harness.owner("Olive Owner");
    let properties = harness.platform.properties();

    let imported = properties
        .import(
            &admin,
            vec![
                roll_record("410 Court St NE", "Maria Alvarez"),
                roll_record("1200 State St", "Robert Lang"),
            ],
        )
        .expect("imported");
    assert_eq!(imported.len(), 2);
    assert!(imported
        .iter()
        .all(|property| property.status == PropertyStatus::Active && property.owner_id.is_none()));
    assert_eq!(imported[0].utilities, vec![UtilityKind::Water, UtilityKind::Sewer]);

    let again = properties
        .import(
            &admin,
            vec![
                roll_record("410 COURT ST NE", "Maria Alvarez"),
                roll_record("88 Mission St", "Jin Park"),
            ],
        )
        .expect("imported");
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].address, "88 Mission St");
    assert_eq!(harness.tables().properties.len(), 3);

    assert!(matches!(
        properties.import(&owner, vec![roll_record("1 Elm St", "Someone")]),
        Err(WorkflowError::NotAuthorized(DenialReason::RoleRequired(_)))
    ));
    assert!(matches!(
        properties.import(
            &admin,
            vec![PropertyDraft {
                address: " ".to_string(),
                ..roll_record("", "Nobody")
            }]
        ),
        Err(WorkflowError::Validation(_))
    ));
}

#[test]
fn submissions_come_only_from_contractors() {
    let harness = Harness::new();
    let owner = harness.owner("Olive Owner");

    assert!(matches!(
        harness
            .platform
            .properties()
            .submit_property(&owner, roll_record("9 Vine St", "Olive Owner")),
        Err(WorkflowError::NotAuthorized(DenialReason::RoleRequired(_)))
    ));
    assert!(harness.tables().properties.is_empty());
}
