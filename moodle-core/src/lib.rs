mod client;
mod types;

pub use client::{ApiErrorClass, DEFAULT_SERVICE, MoodleClient, MoodleError, functions};
pub use types::{
    Assignment, AssignmentCourse, CourseModule, CourseSection, CourseSummary, EnrolledCourse,
    EnrolledUser, FileArea, FileContent, LastAttempt, SiteInfo, Submission, SubmissionPlugin,
    SubmissionStatus, UrlModule,
};
