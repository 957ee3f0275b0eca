use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Admin, AdminRole, Announcement, SystemSetting};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAdminRequest {
    pub username: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: AdminRole,
}

fn default_role() -> AdminRole {
    AdminRole::Admin
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminList {
    pub items: Vec<Admin>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAnnouncementRequest {
    pub content: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i32,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateAnnouncementRequest {
    pub content: Option<String>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnnouncementList {
    pub items: Vec<Announcement>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSettingRequest {
    pub value: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SettingList {
    pub items: Vec<SystemSetting>,
}
