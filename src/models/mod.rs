// Models module

pub mod attachment;
pub mod bookmark;
pub mod study;
pub mod user;

// Re-export commonly used types
pub use attachment::{AttachmentStatus, IncomingFile, UploadedFile};
pub use bookmark::{Bookmark, ContentType, CreateBookmarkRequest};
pub use study::{Difficulty, Flashcard, FlashcardDraft, QuestionDraft, Quiz, QuizQuestion, Summary};
pub use user::{NewUser, PasswordResetOtp, SignupRequest, SigninRequest, User};
