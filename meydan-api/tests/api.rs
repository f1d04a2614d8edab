use meydan_api::server::{self, ServerState};
use meydan_common::{
    model::{
        auth::PasswordDigest,
        user::{Contact, NewUser, Role},
    },
    snowflake::WorkerId,
};
use meydan_db::{client::DbClient, session::SessionStore};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::{net::TcpListener, task::JoinHandle};

const ADMIN_CONTACT: &str = "admin";
const ADMIN_PASSWORD: &str = "yonetici-parola";

struct TestServer {
    base_url: String,
    client: Client,
    handle: JoinHandle<()>,
    _dir: TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        let dir = TempDir::new().unwrap();
        let db = DbClient::open(dir.path().join("db.json"), WorkerId::default())
            .await
            .unwrap();
        db.ensure_admin(NewUser {
            name: "Yönetici".to_owned(),
            contact: Contact::new(ADMIN_CONTACT.to_owned()).unwrap(),
            password: PasswordDigest::hash(ADMIN_PASSWORD).unwrap(),
            role: Role::Admin,
        })
        .await
        .unwrap();

        let app = server::app(ServerState::new(db, SessionStore::new(None)));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/api", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: Client::new(),
            handle,
            _dir: dir,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(format!("{}{path}", self.base_url))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(format!("{}{path}", self.base_url))
    }

    fn put(&self, path: &str) -> RequestBuilder {
        self.client.put(format!("{}{path}", self.base_url))
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        self.client.delete(format!("{}{path}", self.base_url))
    }

    async fn login(&self, contact: &str, password: &str) -> String {
        let response = self
            .post("/login")
            .json(&json!({"contact": contact, "password": password}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_owned()
    }

    async fn admin(&self) -> String {
        self.login(ADMIN_CONTACT, ADMIN_PASSWORD).await
    }

    /// Registers a villager and returns their token.
    async fn user(&self, contact: &str) -> String {
        let response = self
            .post("/register")
            .json(&json!({"name": "Köylü", "contact": contact, "password": "parola"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        self.login(contact, "parola").await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn json_of(response: Response) -> Value {
    response.json().await.unwrap()
}

fn ids(listing: &Value) -> Vec<u64> {
    listing
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_u64().unwrap())
        .collect()
}

#[tokio::test]
async fn non_content_collections_are_forbidden_for_everyone() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin().await;
    let user = srv.user("0532").await;

    for kind in ["users", "market", "tickets", "announcements", "settings"] {
        let path = format!("/content/{kind}");

        let anonymous = srv.get(&path).send().await.unwrap();
        let as_user = srv.get(&path).bearer_auth(&user).send().await.unwrap();
        let as_admin = srv.get(&path).bearer_auth(&admin).send().await.unwrap();

        assert_eq!(anonymous.status(), StatusCode::FORBIDDEN, "{kind}");
        assert_eq!(as_user.status(), StatusCode::FORBIDDEN, "{kind}");
        assert_eq!(as_admin.status(), StatusCode::FORBIDDEN, "{kind}");
    }
}

#[tokio::test]
async fn only_admins_write_content() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin().await;
    let user = srv.user("0532").await;

    let created = srv
        .post("/content/genealogy")
        .bearer_auth(&admin)
        .json(&json!({"title": "A"}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::OK);
    let created = json_of(created).await;
    assert_eq!(created["title"], "A");

    let by_user = srv
        .post("/content/genealogy")
        .bearer_auth(&user)
        .json(&json!({"title": "B"}))
        .send()
        .await
        .unwrap();
    assert_eq!(by_user.status(), StatusCode::FORBIDDEN);

    let by_anonymous = srv
        .post("/content/genealogy")
        .json(&json!({"title": "C"}))
        .send()
        .await
        .unwrap();
    assert_eq!(by_anonymous.status(), StatusCode::UNAUTHORIZED);

    let listed = json_of(srv.get("/content/genealogy").send().await.unwrap()).await;
    assert_eq!(listed, json!([created]));
}

#[tokio::test]
async fn admin_create_checks_role_before_collection() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin().await;
    let user = srv.user("0532").await;

    let as_admin = srv
        .post("/content/users")
        .bearer_auth(&admin)
        .json(&json!({"contact": "x"}))
        .send()
        .await
        .unwrap();
    let as_user = srv
        .post("/content/users")
        .bearer_auth(&user)
        .json(&json!({"contact": "x"}))
        .send()
        .await
        .unwrap();
    let not_an_object = srv
        .post("/content/gallery")
        .bearer_auth(&admin)
        .json(&json!(["a.jpg"]))
        .send()
        .await
        .unwrap();

    assert_eq!(as_admin.status(), StatusCode::BAD_REQUEST);
    assert_eq!(as_user.status(), StatusCode::FORBIDDEN);
    assert_eq!(not_an_object.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn created_items_get_fresh_increasing_ids() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin().await;

    let mut previous = 0;
    for title in ["Bir", "İki", "Üç"] {
        let item = json_of(
            srv.post("/content/documents")
                .bearer_auth(&admin)
                .json(&json!({"id": 1, "title": title}))
                .send()
                .await
                .unwrap(),
        )
        .await;

        let id = item["id"].as_u64().unwrap();
        assert!(id > previous);
        previous = id;
    }

    let listed = json_of(srv.get("/content/documents").send().await.unwrap()).await;
    let listed_ids = ids(&listed);
    assert_eq!(listed_ids.len(), 3);
    assert!(listed_ids.is_sorted());
}

#[tokio::test]
async fn content_deletion_is_admin_only() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin().await;
    let user = srv.user("0532").await;

    let item = json_of(
        srv.post("/content/deceased")
            .bearer_auth(&admin)
            .json(&json!({"name": "Hasan"}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    let path = format!("/content/deceased/{}", item["id"]);

    let by_user = srv.delete(&path).bearer_auth(&user).send().await.unwrap();
    assert_eq!(by_user.status(), StatusCode::FORBIDDEN);

    let missing_by_user = srv
        .delete("/content/genealogy/12345")
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(missing_by_user.status(), StatusCode::FORBIDDEN);

    let by_admin = srv.delete(&path).bearer_auth(&admin).send().await.unwrap();
    assert_eq!(by_admin.status(), StatusCode::NO_CONTENT);

    let again = srv.delete(&path).bearer_auth(&admin).send().await.unwrap();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn market_moderation() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin().await;
    let seller = srv.user("0532").await;
    let neighbour = srv.user("0533").await;

    let listing = json_of(
        srv.post("/market")
            .bearer_auth(&seller)
            .json(&json!({
                "title": "X",
                "price": "10",
                "status": "approved",
                "owner": "mallory",
                "role": "admin"
            }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(listing["status"], "pending");
    assert_eq!(listing["owner"], "0532");
    assert_eq!(listing["image"], "images/default_market.jpg");
    let id = listing["id"].as_u64().unwrap();

    let anonymous = json_of(srv.get("/market").send().await.unwrap()).await;
    let own = json_of(srv.get("/market").bearer_auth(&seller).send().await.unwrap()).await;
    let other = json_of(srv.get("/market").bearer_auth(&neighbour).send().await.unwrap()).await;
    let all = json_of(srv.get("/market").bearer_auth(&admin).send().await.unwrap()).await;
    assert_eq!(ids(&anonymous), Vec::<u64>::new());
    assert_eq!(ids(&own), [id]);
    assert_eq!(ids(&other), Vec::<u64>::new());
    assert_eq!(ids(&all), [id]);

    let path = format!("/market/approve/{id}");
    let by_user = srv.post(&path).bearer_auth(&seller).send().await.unwrap();
    let by_anonymous = srv.post(&path).send().await.unwrap();
    assert_eq!(by_user.status(), StatusCode::FORBIDDEN);
    assert_eq!(by_anonymous.status(), StatusCode::UNAUTHORIZED);

    let approved = srv.post(&path).bearer_auth(&admin).send().await.unwrap();
    assert_eq!(approved.status(), StatusCode::OK);
    assert_eq!(json_of(approved).await["status"], "approved");

    let twice = srv.post(&path).bearer_auth(&admin).send().await.unwrap();
    assert_eq!(twice.status(), StatusCode::OK);
    assert_eq!(json_of(twice).await["status"], "approved");

    let anonymous = json_of(srv.get("/market").send().await.unwrap()).await;
    assert_eq!(ids(&anonymous), [id]);

    let missing = srv
        .post("/market/approve/1")
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_listings_start_approved() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin().await;

    let listing = json_of(
        srv.post("/market")
            .bearer_auth(&admin)
            .json(&json!({"title": "Tohum", "price": 5}))
            .send()
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(listing["status"], "approved");
    assert_eq!(listing["price"], "5");

    let anonymous = json_of(srv.get("/market").send().await.unwrap()).await;
    assert_eq!(anonymous.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn anonymous_cannot_sell() {
    let srv = TestServer::spawn().await;

    let response = srv
        .post("/market")
        .json(&json!({"title": "X"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn owners_and_admins_delete_listings() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin().await;
    let seller = srv.user("0532").await;
    let neighbour = srv.user("0533").await;

    let mut ids = Vec::new();
    for title in ["Odun", "Saman"] {
        let listing = json_of(
            srv.post("/market")
                .bearer_auth(&seller)
                .json(&json!({"title": title}))
                .send()
                .await
                .unwrap(),
        )
        .await;
        ids.push(listing["id"].as_u64().unwrap());
    }

    let first = format!("/market/{}", ids[0]);
    let by_neighbour = srv.delete(&first).bearer_auth(&neighbour).send().await.unwrap();
    let by_anonymous = srv.delete(&first).send().await.unwrap();
    assert_eq!(by_neighbour.status(), StatusCode::FORBIDDEN);
    assert_eq!(by_anonymous.status(), StatusCode::UNAUTHORIZED);

    let by_owner = srv.delete(&first).bearer_auth(&seller).send().await.unwrap();
    assert_eq!(by_owner.status(), StatusCode::NO_CONTENT);
    let gone = srv.delete(&first).bearer_auth(&seller).send().await.unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    let via_content = srv
        .delete(&format!("/content/market/{}", ids[1]))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(via_content.status(), StatusCode::NO_CONTENT);

    let all = json_of(srv.get("/market").bearer_auth(&admin).send().await.unwrap()).await;
    assert_eq!(all, json!([]));
}

#[tokio::test]
async fn ticket_desk() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin().await;
    let villager = srv.user("0532").await;
    let other = srv.user("0533").await;

    let anonymous = srv.get("/tickets").send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let ticket = json_of(
        srv.post("/tickets")
            .bearer_auth(&villager)
            .json(&json!({"type": "Arıza", "message": "Su yok", "status": "resolved"}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(ticket["status"], "pending");
    assert_eq!(ticket["adminResponse"], Value::Null);
    assert_eq!(ticket["userId"], "0532");
    assert_eq!(ticket["name"], "Köylü");
    let id = ticket["id"].as_u64().unwrap();

    let snooping = srv
        .get("/tickets?userId=0532")
        .bearer_auth(&other)
        .send()
        .await
        .unwrap();
    assert_eq!(snooping.status(), StatusCode::FORBIDDEN);
    let nobody = srv
        .get("/tickets?userId=nobody&role=admin")
        .bearer_auth(&other)
        .send()
        .await
        .unwrap();
    assert_eq!(nobody.status(), StatusCode::FORBIDDEN);

    let own = json_of(
        srv.get("/tickets?userId=0532")
            .bearer_auth(&villager)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(ids(&own), [id]);
    let others_own = json_of(srv.get("/tickets").bearer_auth(&other).send().await.unwrap()).await;
    assert_eq!(others_own, json!([]));
    let all = json_of(srv.get("/tickets").bearer_auth(&admin).send().await.unwrap()).await;
    assert_eq!(ids(&all), [id]);

    let path = format!("/tickets/{id}/respond");
    let by_user = srv
        .put(&path)
        .bearer_auth(&villager)
        .json(&json!({"response": "Kendim çözdüm"}))
        .send()
        .await
        .unwrap();
    assert_eq!(by_user.status(), StatusCode::FORBIDDEN);

    let empty = srv
        .put(&path)
        .bearer_auth(&admin)
        .json(&json!({"response": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let resolved = json_of(
        srv.put(&path)
            .bearer_auth(&admin)
            .json(&json!({"response": "Ekip yolda"}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(resolved["status"], "resolved");
    assert_eq!(resolved["adminResponse"], "Ekip yolda");

    let again = json_of(
        srv.put(&path)
            .bearer_auth(&admin)
            .json(&json!({"response": "Başka"}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(again["adminResponse"], "Ekip yolda");

    let missing = srv
        .put("/tickets/1/respond")
        .bearer_auth(&admin)
        .json(&json!({"response": "?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn announcements() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin().await;
    let user = srv.user("0532").await;

    let defaults = json_of(srv.get("/announcements").send().await.unwrap()).await;
    assert_eq!(
        defaults,
        json!(["Sitemize Hoş Geldiniz!", "Köy Pazarı açılmıştır."])
    );

    let by_user = srv
        .post("/announcements")
        .bearer_auth(&user)
        .json(&json!({"announcements": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(by_user.status(), StatusCode::FORBIDDEN);

    let not_a_list = srv
        .post("/announcements")
        .bearer_auth(&admin)
        .json(&json!({"announcements": "Hasat bayramı"}))
        .send()
        .await
        .unwrap();
    assert_eq!(not_a_list.status(), StatusCode::BAD_REQUEST);

    let replaced = srv
        .post("/announcements")
        .bearer_auth(&admin)
        .json(&json!({"announcements": ["Hasat bayramı"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(json_of(replaced).await, json!(["Hasat bayramı"]));

    let listed = json_of(srv.get("/announcements").send().await.unwrap()).await;
    assert_eq!(listed, json!(["Hasat bayramı"]));
}

#[tokio::test]
async fn registration_and_login() {
    let srv = TestServer::spawn().await;

    let missing = srv
        .post("/register")
        .json(&json!({"name": "Ali", "contact": "0532"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let blank = srv
        .post("/register")
        .json(&json!({"name": " ", "contact": "0532", "password": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

    let registered = srv
        .post("/register")
        .json(&json!({"name": "Ali", "contact": "0532", "password": "parola"}))
        .send()
        .await
        .unwrap();
    assert_eq!(registered.status(), StatusCode::OK);
    let registered = json_of(registered).await;
    assert_eq!(registered["role"], "user");
    assert!(registered.get("password").is_none());

    let duplicate = srv
        .post("/register")
        .json(&json!({"name": "Veli", "contact": "0532", "password": "başka"}))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

    let wrong = srv
        .post("/login")
        .json(&json!({"contact": "0532", "password": "yanlış"}))
        .send()
        .await
        .unwrap();
    let unknown = srv
        .post("/login")
        .json(&json!({"contact": "0999", "password": "parola"}))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_of(wrong).await["message"], json_of(unknown).await["message"]);

    let login = json_of(
        srv.post("/login")
            .json(&json!({"contact": "0532", "password": "parola"}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(login["user"], "0532");
    assert_eq!(login["fullName"], "Ali");
    assert_eq!(login["role"], "user");
    assert!(login["token"].is_string());
}

#[tokio::test]
async fn password_changes() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin().await;
    let user = srv.user("0532").await;

    let by_admin = srv
        .post("/change-password")
        .bearer_auth(&admin)
        .json(&json!({"oldPassword": ADMIN_PASSWORD, "newPassword": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(by_admin.status(), StatusCode::FORBIDDEN);

    let by_anonymous = srv
        .post("/change-password")
        .json(&json!({"oldPassword": "parola", "newPassword": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(by_anonymous.status(), StatusCode::UNAUTHORIZED);

    let wrong_old = srv
        .post("/change-password")
        .bearer_auth(&user)
        .json(&json!({"oldPassword": "yanlış", "newPassword": "yeni"}))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_old.status(), StatusCode::BAD_REQUEST);

    let changed = srv
        .post("/change-password")
        .bearer_auth(&user)
        .json(&json!({"oldPassword": "parola", "newPassword": "yeni"}))
        .send()
        .await
        .unwrap();
    assert_eq!(changed.status(), StatusCode::NO_CONTENT);

    srv.login("0532", "yeni").await;
}

#[tokio::test]
async fn bad_tokens() {
    let srv = TestServer::spawn().await;
    let user = srv.user("0532").await;

    let logout = srv.post("/logout").bearer_auth(&user).send().await.unwrap();
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);

    let protected = srv
        .post("/tickets")
        .bearer_auth(&user)
        .json(&json!({"type": "Öneri", "message": "Park"}))
        .send()
        .await
        .unwrap();
    assert_eq!(protected.status(), StatusCode::UNAUTHORIZED);

    let garbage = srv
        .get("/tickets")
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);

    let optional = srv.get("/market").bearer_auth(&user).send().await.unwrap();
    assert_eq!(optional.status(), StatusCode::OK);

    let no_header = srv.post("/logout").send().await.unwrap();
    assert_eq!(no_header.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_routes_are_json_404s() {
    let srv = TestServer::spawn().await;

    let response = srv.get("/nowhere").send().await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_of(response).await["status"], 404);
}
