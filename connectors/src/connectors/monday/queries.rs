pub const ACCOUNT: &str = r#"
query {
  account {
    id
    name
    slug
    tier
    country_code
    first_day_of_the_week
    show_timeline_weekends
    sign_up_product_kind
    active_members_count
    logo
    plan { max_users period tier version }
  }
}
"#;

pub const ACCOUNT_ROLES: &str = r#"
query {
  account_roles {
    id
    name
    roleType
  }
}
"#;

pub const USERS: &str = r#"
query ($limit: Int, $page: Int) {
  users(limit: $limit, page: $page) {
    id
    name
    email
    enabled
    is_admin
    is_guest
    is_pending
    is_view_only
    created_at
    last_activity
    title
    location
    time_zone_identifier
    utc_hours_diff
    account { id }
    teams { id }
  }
}
"#;

pub const BOARDS: &str = r#"
query ($limit: Int, $page: Int) {
  boards(limit: $limit, page: $page) {
    id
    name
    state
    board_kind
    description
    permissions
    type
    updated_at
    workspace_id
    board_folder_id
    items_count
    creator { id }
    owners { id }
    subscribers { id }
    tags { id }
  }
}
"#;

pub const WORKSPACES: &str = r#"
query ($ids: [ID!]) {
  workspaces(ids: $ids) {
    id
    name
    kind
    description
    state
    created_at
    is_default_workspace
    account_product { id kind }
    owners_subscribers { id }
    teams_subscribers { id }
    users_subscribers { id }
  }
}
"#;

pub const UPDATES: &str = r#"
query ($limit: Int, $from_date: String, $to_date: String) {
  updates(limit: $limit, from_date: $from_date, to_date: $to_date) {
    id
    body
    text_body
    created_at
    updated_at
    edited_at
    item_id
    creator_id
    creator { id }
  }
}
"#;

pub const TEAMS: &str = r#"
query {
  teams {
    id
    name
    picture_url
    is_guest
    owners { id }
    users { id }
  }
}
"#;

pub const TAGS: &str = r#"
query {
  tags {
    id
    name
    color
  }
}
"#;

pub const CUSTOM_ACTIVITIES: &str = r#"
query {
  custom_activity {
    id
    name
    type
    color
    icon_id
  }
}
"#;
