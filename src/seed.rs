use sea_orm::*;

use crate::auth::hash_password;
use crate::models::{account, badge, item, quest, school};

/// Seed a demo school with accounts, quests, items and badges. Skips
/// entirely if the demo school already exists.
pub async fn seed_demo_data(db: &DatabaseConnection) -> Result<(), DbErr> {
    let existing = school::Entity::find()
        .filter(school::Column::Subdomain.eq("demo"))
        .one(db)
        .await?;
    if existing.is_some() {
        tracing::info!("Demo school already present, skipping seed");
        return Ok(());
    }

    let now = chrono::Utc::now().to_rfc3339();

    // 1. Create School
    let demo_school = school::ActiveModel {
        name: Set("Demo School".to_owned()),
        subdomain: Set("demo".to_owned()),
        is_active: Set(true),
        created_at: Set(now.clone()),
        updated_at: Set(now.clone()),
        ..Default::default()
    };
    let demo_school = demo_school.insert(db).await?;

    // 2. Create Accounts
    let admin_password = hash_password("admin").unwrap();
    let student_password = hash_password("student").unwrap();

    let admin = account::ActiveModel {
        school_id: Set(demo_school.id),
        username: Set("admin".to_owned()),
        password_hash: Set(admin_password),
        role: Set("admin".to_owned()),
        created_at: Set(now.clone()),
        updated_at: Set(now.clone()),
        ..Default::default()
    };
    admin.insert(db).await?;

    for name in ["ada", "blaise", "kurt"] {
        let student = account::ActiveModel {
            school_id: Set(demo_school.id),
            username: Set(name.to_owned()),
            password_hash: Set(student_password.clone()),
            role: Set("student".to_owned()),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        };
        student.insert(db).await?;
    }

    // 3. Create Quests
    let quests = vec![
        ("Read a chapter", 20, "manual"),
        ("Finish the math worksheet", 50, "manual"),
        ("Log in for the first time", 10, "auto"),
    ];
    for (title, points, validation) in quests {
        let q = quest::ActiveModel {
            school_id: Set(demo_school.id),
            title: Set(title.to_owned()),
            description: Set(None),
            points_award: Set(points),
            validation_type: Set(validation.to_owned()),
            deadline: Set(None),
            is_active: Set(true),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        };
        q.insert(db).await?;
    }

    // 4. Create Items
    let pencil = item::ActiveModel {
        school_id: Set(demo_school.id),
        name: Set("Glitter pencil".to_owned()),
        description: Set(Some("A pencil, but shiny".to_owned())),
        kind: Set("product".to_owned()),
        price_points: Set(30),
        stock: Set(Some(25)),
        max_per_account: Set(Some(2)),
        is_active: Set(true),
        created_at: Set(now.clone()),
        updated_at: Set(now.clone()),
        ..Default::default()
    };
    pencil.insert(db).await?;

    let homework_pass = item::ActiveModel {
        school_id: Set(demo_school.id),
        name: Set("Homework pass".to_owned()),
        description: Set(Some("Skip one homework assignment".to_owned())),
        kind: Set("reward".to_owned()),
        price_points: Set(100),
        stock: Set(None),
        max_per_account: Set(Some(1)),
        is_active: Set(true),
        created_at: Set(now.clone()),
        updated_at: Set(now.clone()),
        ..Default::default()
    };
    homework_pass.insert(db).await?;

    // 5. Create Badges
    let badges = vec![
        ("First steps", Some(10i64), None, None),
        ("Point collector", Some(250), None, None),
        ("Quest regular", None, Some(5), None),
        ("Level five", None, None, Some(5)),
    ];
    for (name, required_points, required_quests, required_level) in badges {
        let b = badge::ActiveModel {
            school_id: Set(demo_school.id),
            name: Set(name.to_owned()),
            description: Set(None),
            icon: Set(Some(format!(
                "badges/{}.png",
                name.to_lowercase().replace(' ', "_")
            ))),
            required_level: Set(required_level),
            required_quests: Set(required_quests),
            required_points: Set(required_points),
            is_active: Set(true),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        };
        b.insert(db).await?;
    }

    Ok(())
}
