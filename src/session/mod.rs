mod state;
mod student;
mod teacher;

pub use state::{ClassroomState, SessionState};
pub use student::{Delivery, StudentSession};
pub use teacher::TeacherSession;
