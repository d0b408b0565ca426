use axum::Router;
use serde_json::{json, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes::{articles, health, roles, settings, users};

#[derive(OpenApi)]
#[openapi(
	paths(
		health::health,
		users::create_user,
		users::get_user,
		users::delete_user,
		users::change_password,
		roles::list_roles,
		roles::list_user_roles,
		roles::assign_role,
		roles::revoke_role,
		roles::list_permissions,
		roles::list_role_permissions,
		roles::grant_permission,
		roles::revoke_permission,
		settings::list_definitions,
		settings::get_settings,
		settings::update_settings,
		articles::list_articles,
		articles::create_article,
		articles::get_article,
		articles::update_article,
		articles::delete_article,
		articles::add_tag,
		articles::like_article,
		articles::add_category,
		articles::remove_category,
		articles::list_article_categories,
		articles::list_category_articles
	),
	components(
		schemas(
			health::HealthResponse,
			models::user::User,
			models::user::CreateUserRequest,
			models::user::ChangePasswordRequest,
			models::rbac::Role,
			models::rbac::Permission,
			models::rbac::UserRole,
			models::rbac::GrantOutcome,
			models::rbac::GrantResponse,
			models::settings::SettingDefinition,
			models::settings::UserSetting,
			models::settings::SettingsUpdateRequest,
			models::article::Article,
			models::article::ArticleCreateRequest,
			models::article::ArticleUpdateRequest,
			models::article::Category
		)
	),
	tags(
		(name = "Health", description = "Liveness and database check"),
		(name = "Users", description = "Account provisioning and lifecycle"),
		(name = "RBAC", description = "Role assignment and role/permission grants"),
		(name = "Settings", description = "Per-account settings"),
		(name = "Articles", description = "Articles, tags, categories and likes")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	ensure_openapi_version(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
	Router::new().merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", doc))
}

fn ensure_openapi_version(doc: &mut Value) {
	if let Some(root) = doc.as_object_mut() {
		root.entry("openapi")
			.or_insert_with(|| Value::String("3.1.0".to_string()));
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{port}");

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn servers_entry_uses_port() {
		let doc = serde_json::to_value(build_openapi(9100).unwrap()).unwrap();
		assert_eq!(doc["servers"][0]["url"], "http://localhost:9100");
	}
}
