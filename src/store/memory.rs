//! Process-local store. Contents live as long as the process; every
//! operation takes the single lock, so check-and-insert sequences are atomic
//! in the same way the Postgres unique constraints make them.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo::{AuditRepo, UserRepo};
use crate::auth::repo_types::{
    Activity, AuditLogEntry, FailedLoginEntry, NewUser, ProfileUpdate, User,
};
use crate::courses::repo::{CourseRepo, EnrollmentRepo};
use crate::courses::repo_types::{
    Course, Enrollment, EnrollmentUpdate, EnrollmentWithCourse, NewCourse,
};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    courses: HashMap<String, Course>,
    enrollments: Vec<Enrollment>,
    audit_logs: Vec<AuditLogEntry>,
    failed_logins: Vec<FailedLoginEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

/// Newest first; entries sharing a timestamp keep reverse insertion order.
fn newest_first<T: Clone>(items: &[T], ts: impl Fn(&T) -> OffsetDateTime) -> Vec<T> {
    let mut out: Vec<T> = items.iter().rev().cloned().collect();
    out.sort_by(|a, b| ts(b).cmp(&ts(a)));
    out
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.lock()?.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.lock()?.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create_user(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        let mut inner = self.lock()?;
        if inner.users.iter().any(|u| u.email == new.email) {
            return Ok(None);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            mfa_secret: None,
            mfa_last_step: None,
            profile_picture_url: new.profile_picture_url,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.users.push(user.clone());
        Ok(Some(user))
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        Ok(self.lock()?.users.clone())
    }

    async fn search_users(&self, query: &str) -> anyhow::Result<Vec<User>> {
        let needle = query.to_lowercase();
        Ok(self
            .lock()?
            .users
            .iter()
            .filter(|u| {
                u.name.to_lowercase().contains(&needle) || u.email.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> anyhow::Result<Option<User>> {
        let mut inner = self.lock()?;
        let Some(user) = inner.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(url) = update.profile_picture_url {
            user.profile_picture_url = Some(url);
        }
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        let before = inner.users.len();
        inner.users.retain(|u| u.id != id);
        if inner.users.len() == before {
            return Ok(false);
        }
        inner.enrollments.retain(|e| e.user_id != id);
        Ok(true)
    }

    async fn set_mfa_secret(&self, id: Uuid, secret: &str) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.mfa_secret = Some(secret.to_string());
            user.mfa_last_step = None;
        }
        Ok(())
    }

    async fn consume_otp_step(&self, id: Uuid, step: i64) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        let Some(user) = inner.users.iter_mut().find(|u| u.id == id) else {
            return Ok(false);
        };
        match user.mfa_last_step {
            Some(last) if last >= step => Ok(false),
            _ => {
                user.mfa_last_step = Some(step);
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl AuditRepo for MemoryStore {
    async fn record_audit(&self, user_email: &str, activity: Activity) -> anyhow::Result<()> {
        self.lock()?.audit_logs.push(AuditLogEntry {
            id: Uuid::new_v4(),
            user_email: user_email.to_string(),
            activity: activity.as_str().to_string(),
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(())
    }

    async fn record_failed_login(&self, email: &str, ip_address: &str) -> anyhow::Result<()> {
        self.lock()?.failed_logins.push(FailedLoginEntry {
            id: Uuid::new_v4(),
            email: email.to_string(),
            ip_address: ip_address.to_string(),
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(())
    }

    async fn list_audit_logs(&self) -> anyhow::Result<Vec<AuditLogEntry>> {
        Ok(newest_first(&self.lock()?.audit_logs, |e| e.created_at))
    }

    async fn list_failed_logins(&self) -> anyhow::Result<Vec<FailedLoginEntry>> {
        Ok(newest_first(&self.lock()?.failed_logins, |e| e.created_at))
    }
}

#[async_trait]
impl CourseRepo for MemoryStore {
    async fn find_course(&self, course_id: &str) -> anyhow::Result<Option<Course>> {
        Ok(self.lock()?.courses.get(course_id).cloned())
    }

    async fn create_course(&self, new: NewCourse) -> anyhow::Result<Option<Course>> {
        let mut inner = self.lock()?;
        if inner.courses.contains_key(&new.course_id) {
            return Ok(None);
        }
        let course = Course {
            course_id: new.course_id,
            title: new.title,
            description: new.description,
            category: new.category,
            difficulty_level: new.difficulty_level,
            created_by: new.created_by,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.courses.insert(course.course_id.clone(), course.clone());
        Ok(Some(course))
    }

    async fn list_courses(&self) -> anyhow::Result<Vec<Course>> {
        let inner = self.lock()?;
        let mut courses: Vec<Course> = inner.courses.values().cloned().collect();
        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(courses)
    }
}

#[async_trait]
impl EnrollmentRepo for MemoryStore {
    async fn insert_enrollment(
        &self,
        user_id: Uuid,
        course_id: &str,
    ) -> anyhow::Result<Option<Enrollment>> {
        let mut inner = self.lock()?;
        if inner
            .enrollments
            .iter()
            .any(|e| e.user_id == user_id && e.course_id == course_id)
        {
            return Ok(None);
        }
        let enrollment = Enrollment::new(user_id, course_id, OffsetDateTime::now_utc());
        inner.enrollments.push(enrollment.clone());
        Ok(Some(enrollment))
    }

    async fn list_enrollments(&self, user_id: Uuid) -> anyhow::Result<Vec<EnrollmentWithCourse>> {
        let inner = self.lock()?;
        let owned: Vec<Enrollment> = inner
            .enrollments
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(&owned, |e| e.enrolled_at)
            .into_iter()
            .filter_map(|enrollment| {
                // Inner join: enrollments whose course vanished are skipped.
                let course = inner.courses.get(&enrollment.course_id)?.clone();
                Some(EnrollmentWithCourse { enrollment, course })
            })
            .collect())
    }

    async fn complete_lesson(
        &self,
        user_id: Uuid,
        course_id: &str,
        lesson_id: &str,
    ) -> anyhow::Result<Option<Enrollment>> {
        let mut inner = self.lock()?;
        let Some(e) = inner
            .enrollments
            .iter_mut()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
        else {
            return Ok(None);
        };
        e.complete_lesson(lesson_id, OffsetDateTime::now_utc());
        Ok(Some(e.clone()))
    }

    async fn update_enrollment(
        &self,
        user_id: Uuid,
        course_id: &str,
        update: EnrollmentUpdate,
    ) -> anyhow::Result<Option<Enrollment>> {
        let mut inner = self.lock()?;
        let Some(e) = inner
            .enrollments
            .iter_mut()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
        else {
            return Ok(None);
        };
        e.apply(&update);
        Ok(Some(e.clone()))
    }
}
