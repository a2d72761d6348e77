//! SQL text for the DJ library database.
//!
//! The history log is `djmdSongHistory`; its rowid is the sequence number.
//! Catalog rows live in `djmdContent` and reference small name tables.

/// Catalog columns shared by the history and track projections.
macro_rules! content_columns {
    () => {
        "c.FolderPath AS filePath,
        c.Title AS title,
        c.Subtitle AS subTitle,
        a.Name AS artist,
        c.ImagePath AS imagePath,
        c.BPM AS bpm,
        c.Rating AS rating,
        c.ReleaseDate AS releaseDate,
        c.Length AS length,
        c.ColorID AS colorId,
        c.Commnt AS comment,
        c.ISRC AS isrc,
        al.Name AS album,
        la.Name AS label,
        ge.Name AS genre,
        k.ScaleName AS key,
        rmx.Name AS remixer"
    };
}

/// Reference-table joins for a catalog row aliased `c`.
macro_rules! reference_joins {
    () => {
        "LEFT JOIN djmdArtist AS a ON c.ArtistID = a.ID
        LEFT JOIN djmdArtist AS rmx ON c.RemixerID = rmx.ID
        LEFT JOIN djmdAlbum AS al ON c.AlbumID = al.ID
        LEFT JOIN djmdLabel AS la ON c.LabelID = la.ID
        LEFT JOIN djmdGenre AS ge ON c.GenreID = ge.ID
        LEFT JOIN djmdKey AS k ON c.KeyID = k.ID"
    };
}

/// Succeeds only when the key decrypts the file.
pub const VERIFY_KEY: &str = "SELECT count(*) FROM sqlite_master";

pub const SELECT_LATEST_SEQUENCE: &str = "SELECT MAX(rowid) FROM djmdSongHistory";

/// Params: `:since`, `:limit`.
pub const SELECT_NEW_HISTORY: &str = concat!(
    "SELECT
        h.rowid AS rowid,
        h.ID AS id,
        h.created_at AS created_at,
        ",
    content_columns!(),
    "
    FROM djmdSongHistory AS h
    JOIN djmdContent AS c ON h.ContentID = c.ID
    ",
    reference_joins!(),
    "
    WHERE h.rowid > :since
    ORDER BY h.rowid ASC
    LIMIT :limit"
);

/// Params: `:limit`.
pub const SELECT_TRACKS: &str = concat!(
    "SELECT
        c.ID AS id,
        ",
    content_columns!(),
    "
    FROM djmdContent AS c
    ",
    reference_joins!(),
    "
    LIMIT :limit"
);

macro_rules! history_record_columns {
    () => {
        "rowid, ID, HistoryID, ContentID, TrackNo, UUID,
        rb_data_status, rb_local_data_status, rb_local_deleted, rb_local_synced,
        usn, rb_local_usn, created_at, updated_at"
    };
}

pub const SELECT_LAST_RECORD: &str = concat!(
    "SELECT ",
    history_record_columns!(),
    " FROM djmdSongHistory WHERE rowid = (SELECT MAX(rowid) FROM djmdSongHistory)"
);

pub const DELETE_RECORD: &str = "DELETE FROM djmdSongHistory WHERE rowid = ?1";

/// Explicit rowid keeps the restored record at its original position.
pub const INSERT_RECORD: &str = concat!(
    "INSERT INTO djmdSongHistory (",
    history_record_columns!(),
    ") VALUES (
        :rowid, :id, :history_id, :content_id, :track_no, :uuid,
        :rb_data_status, :rb_local_data_status, :rb_local_deleted, :rb_local_synced,
        :usn, :rb_local_usn, :created_at, :updated_at
    )"
);

/// Subset of the library schema this crate reads, used to build fixtures.
pub const FIXTURE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS djmdArtist (
    ID VARCHAR(255) PRIMARY KEY,
    Name VARCHAR(255)
);
CREATE TABLE IF NOT EXISTS djmdAlbum (
    ID VARCHAR(255) PRIMARY KEY,
    Name VARCHAR(255)
);
CREATE TABLE IF NOT EXISTS djmdLabel (
    ID VARCHAR(255) PRIMARY KEY,
    Name VARCHAR(255)
);
CREATE TABLE IF NOT EXISTS djmdGenre (
    ID VARCHAR(255) PRIMARY KEY,
    Name VARCHAR(255)
);
CREATE TABLE IF NOT EXISTS djmdKey (
    ID VARCHAR(255) PRIMARY KEY,
    ScaleName VARCHAR(255)
);
CREATE TABLE IF NOT EXISTS djmdContent (
    ID VARCHAR(255) PRIMARY KEY,
    FolderPath VARCHAR(255),
    Title VARCHAR(255),
    Subtitle VARCHAR(255),
    ArtistID VARCHAR(255),
    RemixerID VARCHAR(255),
    AlbumID VARCHAR(255),
    LabelID VARCHAR(255),
    GenreID VARCHAR(255),
    KeyID VARCHAR(255),
    ImagePath VARCHAR(255),
    BPM INTEGER,
    Rating INTEGER,
    ReleaseDate DATE,
    Length INTEGER,
    ColorID VARCHAR(255),
    Commnt TEXT,
    ISRC VARCHAR(255)
);
CREATE TABLE IF NOT EXISTS djmdSongHistory (
    ID VARCHAR(255) PRIMARY KEY,
    HistoryID VARCHAR(255),
    ContentID VARCHAR(255),
    TrackNo INTEGER,
    UUID VARCHAR(255),
    rb_data_status INTEGER DEFAULT 0,
    rb_local_data_status INTEGER DEFAULT 0,
    rb_local_deleted TINYINT(1) DEFAULT 0,
    rb_local_synced TINYINT(1) DEFAULT 0,
    usn BIGINT,
    rb_local_usn BIGINT,
    created_at DATETIME NOT NULL,
    updated_at DATETIME NOT NULL
);
"#;
