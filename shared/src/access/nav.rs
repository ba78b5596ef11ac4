//! Navigation chrome (header + sidebar) for an allowed page.
//!
//! Which entries an admin sees depends on subscription: without one only the
//! pages needed to get one are listed.

use serde::Serialize;

use crate::types::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NavItem>,
}

impl NavItem {
    fn link(label: &'static str, path: &'static str) -> Self {
        Self {
            label,
            path: Some(path),
            children: Vec::new(),
        }
    }

    fn group(label: &'static str, children: Vec<NavItem>) -> Self {
        Self {
            label,
            path: None,
            children,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chrome {
    pub title: &'static str,
    pub home_link: &'static str,
    pub profile_image: Option<String>,
    pub sidebar: Vec<NavItem>,
}

impl Chrome {
    pub fn for_session(
        role: &Role,
        is_master: bool,
        is_subscribed: bool,
        profile_image: Option<String>,
    ) -> Self {
        match role {
            Role::Student => Self {
                title: "Student Dashboard",
                home_link: "/student",
                profile_image,
                sidebar: student_menu(),
            },
            _ => Self {
                title: "Admin Dashboard",
                home_link: "/profile",
                profile_image,
                sidebar: admin_menu(is_master, is_subscribed),
            },
        }
    }

    /// Every linked path, depth first.
    pub fn paths(&self) -> Vec<&'static str> {
        fn walk(items: &[NavItem], out: &mut Vec<&'static str>) {
            for item in items {
                if let Some(p) = item.path {
                    out.push(p);
                }
                walk(&item.children, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.sidebar, &mut out);
        out
    }
}

fn student_menu() -> Vec<NavItem> {
    vec![
        NavItem::link("Home", "/student"),
        NavItem::link("Profile", "/student/profile"),
        NavItem::link("Requests", "/student/requests"),
    ]
}

fn admin_menu(is_master: bool, is_subscribed: bool) -> Vec<NavItem> {
    let mut items = Vec::new();

    if is_subscribed {
        items.push(NavItem::link("Dashboard", "/dashboard"));
        items.push(NavItem::group(
            "Configuration",
            vec![
                NavItem::link("Shifts", "/configure/shifts"),
                NavItem::link("Configured Shifts", "/configure/shifts-configured"),
                NavItem::link("Seats", "/configure/seats"),
                NavItem::link("Add Student", "/configure/students/add-student"),
                NavItem::link("Student List", "/configure/students/student-list"),
            ],
        ));
        items.push(NavItem::link("Payments", "/payments"));
        items.push(NavItem::link("Past Students", "/past/students"));
        items.push(NavItem::link("Settings", "/settings"));
    }

    items.push(NavItem::link("Profile", "/profile"));
    items.push(NavItem::link("Plans", "/plans"));

    if is_master && is_subscribed {
        items.push(NavItem::link("Configure Plans", "/master/plans"));
    }

    items.push(NavItem::link("Subscription", "/dashboard/subscription"));
    items
}
