use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, Utc};
use clap::Args;
use homefax::error::AppError;
use homefax::workflows::domain::{
    AccessOutcome, AccessRequestType, NoticePriority, PropertyDraft, PropertyId, Role,
    UtilityKind,
};
use homefax::workflows::{
    read_roll, read_roll_file, AccessRequestDraft, Broadcast, BroadcastTarget, FixedClock,
    HomefaxPlatform, InMemoryStore, MaintenanceTaskDraft, OwnershipMatch, PlatformSettings,
    ProjectOpening, ProjectUpdateDraft, RegistrationRequest,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

const SAMPLE_ROLL: &str = "\
Address,City,State,Zip,Owner Name,Year Built,Zoning,Square Feet,Utilities,Assessed Value
2210 Alder St,Eugene,OR,97405,Mrs. Harriet Vance,1938,R-1,1840,water;electric;sewer,\"$412,500\"
77 Pine Ct,Eugene,OR,97404,Gordon Ames,2004,R-1,2210,electric;gas,
915 Lincoln St,Eugene,OR,97401,Dana Whitfield,1962,R-2,1320,water;electric,\"$301,000\"
";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Walkthrough start date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) start: Option<NaiveDate>,
    /// County roll CSV to seed the walkthrough instead of the bundled sample.
    #[arg(long)]
    pub(crate) roll: Option<PathBuf>,
    /// Print the comprehensive property record as JSON at the end.
    #[arg(long)]
    pub(crate) show_record: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RollCheckArgs {
    /// Roll CSV export to inspect
    #[arg(long)]
    pub(crate) path: PathBuf,
    /// List every parsed record
    #[arg(long)]
    pub(crate) list: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct RollSummary {
    pub(crate) records: usize,
    pub(crate) unnamed_owners: usize,
    pub(crate) assessed_total: u64,
    pub(crate) by_city: BTreeMap<String, usize>,
    pub(crate) by_utility: BTreeMap<UtilityKind, usize>,
}

pub(crate) fn summarize_roll(drafts: &[PropertyDraft]) -> RollSummary {
    let mut summary = RollSummary {
        records: drafts.len(),
        ..RollSummary::default()
    };
    for draft in drafts {
        if draft.owner_of_record.is_none() {
            summary.unnamed_owners += 1;
        }
        summary.assessed_total += draft.assessed_value.unwrap_or(0);
        *summary.by_city.entry(draft.city.clone()).or_default() += 1;
        for utility in &draft.utilities {
            *summary.by_utility.entry(*utility).or_default() += 1;
        }
    }
    summary
}

pub(crate) fn run_roll_check(args: RollCheckArgs) -> Result<(), AppError> {
    let RollCheckArgs { path, list } = args;
    let drafts = read_roll_file(&path)?;
    let summary = summarize_roll(&drafts);

    println!("Property roll {}", path.display());
    println!(
        "- {} records | {} without an owner of record | ${} assessed",
        summary.records, summary.unnamed_owners, summary.assessed_total
    );
    println!("Cities:");
    for (city, count) in &summary.by_city {
        println!("  - {city}: {count}");
    }
    println!("Utility service:");
    for (utility, count) in &summary.by_utility {
        println!("  - {utility:?}: {count}");
    }

    if list {
        println!("Records:");
        for draft in &drafts {
            println!(
                "  - {}, {} {} {} | owner {}",
                draft.address,
                draft.city,
                draft.state,
                draft.zip_code,
                draft.owner_of_record.as_deref().unwrap_or("(none)")
            );
        }
    }

    Ok(())
}

fn morning_of(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc() + Duration::hours(8)
}

fn registration(name: &str, role: Role) -> RegistrationRequest {
    RegistrationRequest {
        name: name.to_string(),
        email: format!("{}@homefax.demo", name.to_lowercase().replace(' ', ".")),
        password: "demo-passphrase".to_string(),
        role,
        admin_key: None,
        company: None,
        trade: None,
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        start,
        roll,
        show_record,
    } = args;

    let start = morning_of(start.unwrap_or_else(|| Local::now().date_naive()));
    let clock = Arc::new(FixedClock::new(start));
    let platform = HomefaxPlatform::new(
        Arc::new(InMemoryStore::new()),
        clock.clone(),
        PlatformSettings::default(),
    );

    println!("HomeFax walkthrough starting {}", start.format("%Y-%m-%d"));

    let root = platform.registration().bootstrap_root_admin(
        "Root Administrator",
        "root@homefax.demo",
        "demo-root-secret",
    )?;
    let key = platform.admin_keys().issue("Lane County", &root)?;
    let county_admin = platform
        .registration()
        .register(RegistrationRequest {
            admin_key: Some(key.key_value.clone()),
            ..registration("Casey County", Role::Administrator)
        })?
        .actor;
    println!(
        "- Root issued a {} admin key; {} registered as county administrator",
        key.territory, county_admin.name
    );

    let drafts = match &roll {
        Some(path) => read_roll_file(path)?,
        None => read_roll(SAMPLE_ROLL.as_bytes())?,
    };
    let imported = platform.properties().import(&county_admin, drafts)?;
    println!("- Imported {} county roll records", imported.len());
    let Some(fallback) = imported.first() else {
        println!("  Roll contained no new properties; nothing to walk through");
        return Ok(());
    };

    let owner = platform
        .registration()
        .register(registration("Harriet Vance", Role::Owner))?;
    let property_id: PropertyId = match &owner.ownership {
        OwnershipMatch::Claimed { property_id } => {
            println!("- {} claimed {} at registration", owner.actor.name, property_id);
            *property_id
        }
        other => {
            println!(
                "- {} registered without a claim ({other:?}); administrator assigns {}",
                owner.actor.name, fallback.id
            );
            if fallback.owner_id.is_none() {
                platform
                    .properties()
                    .assign_owner(&county_admin, fallback.id, owner.actor.id)?;
            }
            fallback.id
        }
    };
    let owner = owner.actor;

    let contractor = platform
        .registration()
        .register(RegistrationRequest {
            company: Some("Reyes Renovation".to_string()),
            trade: Some("kitchens".to_string()),
            ..registration("Jordan Reyes", Role::Contractor)
        })?
        .actor;

    let request = platform.access().create(
        (&contractor).into(),
        AccessRequestDraft {
            property_id,
            contractor_id: Some(contractor.id),
            owner_id: None,
            admin_id: None,
            request_type: AccessRequestType::ContractorAccess,
        },
    )?;
    clock.advance(Duration::hours(3));
    let resolution = platform
        .access()
        .resolve(request.id, &owner, AccessOutcome::Approved)?;
    println!(
        "- {} requested access; owner resolved it as {}",
        contractor.name,
        resolution.request.status.label()
    );

    let project = platform.projects().create_from_access_approval(
        request.id,
        &contractor,
        ProjectOpening {
            project_type: Some("kitchen".to_string()),
            description: Some("Full kitchen remodel".to_string()),
        },
    )?;
    println!("- Opened {} project {}", project.project_type, project.id);

    for (day, percent) in [(1, 30u8), (8, 75), (15, 100)] {
        clock.set(start + Duration::days(day));
        let update = platform.projects().append_update(
            &contractor,
            ProjectUpdateDraft {
                project_id: project.id,
                contractor_id: None,
                title: format!("Day {day} site visit"),
                description: "Work on schedule".to_string(),
                progress_percentage: Some(percent),
                files_added: vec![format!("site-day-{day}.jpg")],
                parts_listed: None,
            },
        )?;
        println!("  - {} -> {}% complete", update.title, percent);
    }
    let completed = platform.projects().complete(project.id, &contractor)?;
    println!(
        "- Project {:?} with {} attachments",
        completed.status,
        completed.attachments.len()
    );

    let task = platform.maintenance().add_task(
        &owner,
        property_id,
        MaintenanceTaskDraft {
            title: "Reseal quartz counters".to_string(),
            frequency_months: Some(12),
            owner_editable: true,
        },
    )?;
    let task = platform.maintenance().mark_complete(task.id, &owner)?;
    match task.next_due {
        Some(next_due) => println!(
            "- Maintenance '{}' done; next due {}",
            task.title,
            next_due.format("%Y-%m-%d")
        ),
        None => println!("- Maintenance '{}' done", task.title),
    }

    let notices = platform.broadcast(
        &county_admin,
        Broadcast {
            title: "Hydrant flushing".to_string(),
            message: "Expect discoloured water Tuesday.".to_string(),
            target: BroadcastTarget::ByUtility {
                utility_type: UtilityKind::Water,
            },
            priority: NoticePriority::Normal,
        },
    )?;
    println!("- Water utility broadcast reached {} owners", notices.len());

    println!("Owner inbox (newest first):");
    for notice in platform.notifications().inbox(&owner, false)? {
        println!("  - [{:?}] {}", notice.priority, notice.title);
    }

    let record = platform
        .properties()
        .comprehensive((&contractor).into(), property_id)?;
    println!(
        "- Contractor reads full record: {} projects, {} maintenance tasks, {} access requests",
        record.projects.len(),
        record.maintenance_tasks.len(),
        record.access_requests.len()
    );
    if show_record {
        match serde_json::to_string_pretty(&record) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("  Record unavailable: {err}"),
        }
    }

    let audit = platform.audit_log(&root)?;
    println!("- Audit trail holds {} entries", audit.len());

    Ok(())
}
