use sociopedia::{
    models::{NewPost, NewUser, User},
    repository::{InMemoryRepository, PostgresRepository, RepoError, Repository},
};
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Data Helpers ---

fn new_user(email: &str) -> NewUser {
    NewUser {
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        email: email.to_string(),
        password_hash: "$argon2id$placeholder".to_string(),
        picture_path: Some("test.png".to_string()),
        location: Some("Limerick".to_string()),
        occupation: None,
    }
}

fn new_post(author: &User, description: &str) -> NewPost {
    NewPost {
        user_id: author.id,
        first_name: author.first_name.clone(),
        last_name: author.last_name.clone(),
        location: author.location.clone(),
        description: description.to_string(),
        picture_path: None,
        user_picture_path: author.picture_path.clone(),
    }
}

/// Behaviour every `Repository` implementation must share.
async fn exercise_repository(repo: &dyn Repository, tag: &str) {
    let email = format!("{tag}@test.com");
    let user = repo.create_user(new_user(&email)).await.unwrap();
    assert_eq!(user.email, email);

    // Same address, different case.
    let duplicate = repo.create_user(new_user(&email.to_uppercase())).await;
    assert!(matches!(duplicate, Err(RepoError::Duplicate)));

    let found = repo.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(found.first_name, "Test");
    assert!(repo.get_user(Uuid::new_v4()).await.unwrap().is_none());

    let by_email = repo.find_user_by_email(&email).await.unwrap().unwrap();
    assert_eq!(by_email.id, user.id);

    let first = repo.create_post(new_post(&user, "first")).await.unwrap();
    let second = repo.create_post(new_post(&user, "second")).await.unwrap();
    assert_eq!(first.user_picture_path.as_deref(), Some("test.png"));

    let mine = repo.get_user_posts(user.id).await.unwrap();
    let ids: Vec<Uuid> = mine.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    let feed = repo.get_feed().await.unwrap();
    assert!(feed.iter().any(|p| p.id == first.id));
    assert!(repo.get_user_posts(Uuid::new_v4()).await.unwrap().is_empty());
}

// --- Tests ---

#[tokio::test]
async fn test_in_memory_repository() {
    let repo = InMemoryRepository::new();
    exercise_repository(&repo, "memory").await;
    assert_eq!(repo.post_count(), 2);
}

#[tokio::test]
async fn test_in_memory_feed_is_newest_first_across_users() {
    let repo = InMemoryRepository::new();
    let a = repo.create_user(new_user("a@test.com")).await.unwrap();
    let b = repo.create_user(new_user("b@test.com")).await.unwrap();

    repo.create_post(new_post(&a, "one")).await.unwrap();
    repo.create_post(new_post(&b, "two")).await.unwrap();
    repo.create_post(new_post(&a, "three")).await.unwrap();

    let feed = repo.get_feed().await.unwrap();
    let descriptions: Vec<&str> = feed.iter().map(|p| p.description.as_str()).collect();
    assert_eq!(descriptions, ["three", "two", "one"]);
}

#[tokio::test]
#[ignore = "requires a running Postgres at DATABASE_URL"]
async fn test_postgres_repository() {
    dotenv::dotenv().ok();
    let db_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set to run integration tests");
    let pool = PgPool::connect(&db_url)
        .await
        .expect("Failed to connect to database for integration tests.");

    let repo = PostgresRepository::new(pool);
    repo.migrate().await.expect("Failed to run database migrations.");

    exercise_repository(&repo, &format!("pg-{}", Uuid::new_v4())).await;
}
