use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::events::RequestContext;
use crate::models::article::{Article, ArticleCreateRequest, ArticleUpdateRequest, Category};
use crate::routes::parse_id;
use crate::services::ensure_account;
use crate::utils::utc_now;

const ARTICLE_COLUMNS: &str = "id, author_id, title, content, created_at, updated_at";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/articles", get(list_articles).post(create_article))
        .route("/articles/:id", get(get_article).put(update_article).delete(delete_article))
        .route("/articles/:id/tags/:tag_id", post(add_tag))
        .route("/articles/:id/like/:user_id", post(like_article))
        .route("/articles/:id/categories", get(list_article_categories))
        .route(
            "/articles/:id/categories/:category_id",
            post(add_category).delete(remove_category),
        )
        .route("/categories/:id/articles", get(list_category_articles))
}

#[utoipa::path(
    get,
    path = "/articles",
    tag = "Articles",
    responses((status = 200, description = "All articles", body = [Article]))
)]
pub async fn list_articles(State(state): State<AppState>) -> AppResult<Json<Vec<Article>>> {
    let articles = sqlx::query_as::<_, Article>(&format!("SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY id"))
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(articles))
}

#[utoipa::path(
    post,
    path = "/articles",
    tag = "Articles",
    request_body = ArticleCreateRequest,
    responses(
        (status = 201, description = "Article created", body = Article),
        (status = 400, description = "Empty title or content"),
        (status = 404, description = "Unknown author")
    )
)]
pub async fn create_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ArticleCreateRequest>,
) -> AppResult<(StatusCode, Json<Article>)> {
    if payload.title.trim().is_empty() || payload.content.trim().is_empty() {
        return Err(AppError::validation("title and content must not be empty"));
    }

    let now = utc_now();
    let mut conn = state.pool.acquire().await?;
    ensure_account(&mut conn, payload.author_id).await?;

    let id = sqlx::query(
        "INSERT INTO articles (author_id, title, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(payload.author_id)
    .bind(&payload.title)
    .bind(&payload.content)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    let article = Article {
        id,
        author_id: payload.author_id,
        title: payload.title,
        content: payload.content,
        created_at: now,
        updated_at: now,
    };

    let context = RequestContext::from_headers(&headers);
    state.activity(&context).record("created", &article);

    Ok((StatusCode::CREATED, Json(article)))
}

#[utoipa::path(
    get,
    path = "/articles/{id}",
    tag = "Articles",
    params(("id" = i64, Path, description = "Article id")),
    responses(
        (status = 200, description = "Article", body = Article),
        (status = 404, description = "Unknown article")
    )
)]
pub async fn get_article(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Article>> {
    let article_id = parse_id(&id, "article")?;
    let article = fetch_article(&state, article_id).await?;
    Ok(Json(article))
}

#[utoipa::path(
    put,
    path = "/articles/{id}",
    tag = "Articles",
    params(("id" = i64, Path, description = "Article id")),
    request_body = ArticleUpdateRequest,
    responses(
        (status = 200, description = "Article updated", body = Article),
        (status = 404, description = "Unknown article")
    )
)]
pub async fn update_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<ArticleUpdateRequest>,
) -> AppResult<Json<Article>> {
    let article_id = parse_id(&id, "article")?;

    let blank = |field: &Option<String>| field.as_deref().is_some_and(|v| v.trim().is_empty());
    if blank(&payload.title) || blank(&payload.content) {
        return Err(AppError::validation("title and content must not be empty"));
    }

    let mut tx = state.pool.begin().await?;

    let existing = sqlx::query_as::<_, Article>(&format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?"))
        .bind(article_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found(format!("article {article_id} not found")))?;

    let updated = Article {
        title: payload.title.unwrap_or_else(|| existing.title.clone()),
        content: payload.content.unwrap_or_else(|| existing.content.clone()),
        updated_at: utc_now(),
        ..existing.clone()
    };

    sqlx::query("UPDATE articles SET title = ?, content = ?, updated_at = ? WHERE id = ?")
        .bind(&updated.title)
        .bind(&updated.content)
        .bind(updated.updated_at)
        .bind(article_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let context = RequestContext::from_headers(&headers);
    state
        .activity(&context)
        .record_change("updated", &updated, Some(&existing));

    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/articles/{id}",
    tag = "Articles",
    params(("id" = i64, Path, description = "Article id")),
    responses(
        (status = 204, description = "Article, its likes and its links deleted"),
        (status = 404, description = "Unknown article")
    )
)]
pub async fn delete_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let article_id = parse_id(&id, "article")?;
    let mut tx = state.pool.begin().await?;

    for sql in [
        "DELETE FROM article_likes WHERE article_id = ?",
        "DELETE FROM article_tags WHERE article_id = ?",
        "DELETE FROM article_categories WHERE article_id = ?",
    ] {
        sqlx::query(sql).bind(article_id).execute(&mut *tx).await?;
    }

    let removed: Vec<Article> =
        sqlx::query_as(&format!("DELETE FROM articles WHERE id = ? RETURNING {ARTICLE_COLUMNS}"))
            .bind(article_id)
            .fetch_all(&mut *tx)
            .await?;

    let Some(article) = removed.into_iter().next() else {
        return Err(AppError::not_found(format!("article {article_id} not found")));
    };

    tx.commit().await?;

    let context = RequestContext::from_headers(&headers);
    state.activity(&context).record("deleted", &article);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/articles/{id}/tags/{tag_id}",
    tag = "Articles",
    params(
        ("id" = i64, Path, description = "Article id"),
        ("tag_id" = i64, Path, description = "Tag id")
    ),
    responses(
        (status = 201, description = "Tag attached"),
        (status = 409, description = "Tag already attached")
    )
)]
pub async fn add_tag(
    State(state): State<AppState>,
    Path((id, tag_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let article_id = parse_id(&id, "article")?;
    let tag_id = parse_id(&tag_id, "tag")?;

    sqlx::query("INSERT INTO article_tags (article_id, tag_id) VALUES (?, ?)")
        .bind(article_id)
        .bind(tag_id)
        .execute(&state.pool)
        .await?;

    tracing::debug!(article_id, tag_id, "tag attached");
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    post,
    path = "/articles/{id}/like/{user_id}",
    tag = "Articles",
    params(
        ("id" = i64, Path, description = "Article id"),
        ("user_id" = i64, Path, description = "Account liking the article")
    ),
    responses(
        (status = 201, description = "Like recorded"),
        (status = 409, description = "Already liked")
    )
)]
pub async fn like_article(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let article_id = parse_id(&id, "article")?;
    let user_id = parse_id(&user_id, "user")?;

    sqlx::query("INSERT INTO article_likes (article_id, user_id) VALUES (?, ?)")
        .bind(article_id)
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    tracing::debug!(article_id, user_id, "article liked");
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    post,
    path = "/articles/{id}/categories/{category_id}",
    tag = "Articles",
    params(
        ("id" = i64, Path, description = "Article id"),
        ("category_id" = i64, Path, description = "Category id")
    ),
    responses(
        (status = 201, description = "Article added to category"),
        (status = 409, description = "Article already in category")
    )
)]
pub async fn add_category(
    State(state): State<AppState>,
    Path((id, category_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let article_id = parse_id(&id, "article")?;
    let category_id = parse_id(&category_id, "category")?;

    sqlx::query("INSERT INTO article_categories (article_id, category_id) VALUES (?, ?)")
        .bind(article_id)
        .bind(category_id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    delete,
    path = "/articles/{id}/categories/{category_id}",
    tag = "Articles",
    params(
        ("id" = i64, Path, description = "Article id"),
        ("category_id" = i64, Path, description = "Category id")
    ),
    responses(
        (status = 204, description = "Article removed from category"),
        (status = 404, description = "Article was not in the category")
    )
)]
pub async fn remove_category(
    State(state): State<AppState>,
    Path((id, category_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let article_id = parse_id(&id, "article")?;
    let category_id = parse_id(&category_id, "category")?;

    let result = sqlx::query("DELETE FROM article_categories WHERE article_id = ? AND category_id = ?")
        .bind(article_id)
        .bind(category_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found(format!(
            "article {article_id} is not in category {category_id}"
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/articles/{id}/categories",
    tag = "Articles",
    params(("id" = i64, Path, description = "Article id")),
    responses((status = 200, description = "Categories of the article", body = [Category]))
)]
pub async fn list_article_categories(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Category>>> {
    let article_id = parse_id(&id, "article")?;

    let categories = sqlx::query_as::<_, Category>(
        r#"
        SELECT c.id, c.name
        FROM categories c
        JOIN article_categories ac ON ac.category_id = c.id
        WHERE ac.article_id = ?
        ORDER BY c.id
        "#,
    )
    .bind(article_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(categories))
}

#[utoipa::path(
    get,
    path = "/categories/{id}/articles",
    tag = "Articles",
    params(("id" = i64, Path, description = "Category id")),
    responses((status = 200, description = "Articles in the category", body = [Article]))
)]
pub async fn list_category_articles(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Article>>> {
    let category_id = parse_id(&id, "category")?;

    let articles = sqlx::query_as::<_, Article>(
        r#"
        SELECT a.id, a.author_id, a.title, a.content, a.created_at, a.updated_at
        FROM articles a
        JOIN article_categories ac ON ac.article_id = a.id
        WHERE ac.category_id = ?
        ORDER BY a.id
        "#,
    )
    .bind(category_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(articles))
}

async fn fetch_article(state: &AppState, article_id: i64) -> AppResult<Article> {
    sqlx::query_as::<_, Article>(&format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?"))
        .bind(article_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("article {article_id} not found")))
}
