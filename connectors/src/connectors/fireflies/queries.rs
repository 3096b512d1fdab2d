//! GraphQL documents sent to the Fireflies API.

pub const ACTIVE_MEETINGS: &str = r#"
query ActiveMeetings {
  active_meetings {
    id
    title
    organizer_email
    meeting_link
    start_time
    end_time
    privacy
    state
  }
}
"#;

pub const CHANNELS: &str = r#"
query Channels {
  channels {
    id
    title
    is_private
    created_by
    created_at
    updated_at
    members { user_id email name }
  }
}
"#;

pub const USERS: &str = r#"
query Users {
  users {
    user_id
    email
    name
    num_transcripts
    recent_transcript
    recent_meeting
    minutes_consumed
    is_admin
    integrations
    user_groups {
      id
      name
      handle
      members { user_id first_name last_name email }
    }
  }
}
"#;

pub const USER_GROUPS: &str = r#"
query UserGroups {
  user_groups {
    id
    name
    handle
    members { user_id first_name last_name email }
  }
}
"#;

pub const CONTACTS: &str = r#"
query Contacts {
  contacts {
    email
    name
    picture
    last_meeting_date
  }
}
"#;

pub const BITES: &str = r#"
query Bites($my_team: Boolean, $limit: Int, $skip: Int) {
  bites(my_team: $my_team, limit: $limit, skip: $skip) {
    id
    transcript_id
    name
    thumbnail
    preview
    status
    summary
    user_id
    start_time
    end_time
    summary_status
    media_type
    created_at
    created_from { description duration id name type }
    captions { index speaker_id speaker_name start_time end_time text }
    sources { src type }
    privacies
    user { id name first_name last_name picture }
  }
}
"#;

pub const TRANSCRIPTS: &str = r#"
query Transcripts($limit: Int, $skip: Int) {
  transcripts(limit: $limit, skip: $skip) {
    id
    title
    date
    duration
    host_email
    organizer_email
    calendar_id
    cal_id
    calendar_type
    meeting_link
    transcript_url
    audio_url
    video_url
    participants
    fireflies_users
    speakers { id name }
    user { user_id email name }
    meeting_attendees { displayName email phoneNumber name location }
    meeting_attendance { name join_time leave_time }
    meeting_info { fred_joined silent_meeting summary_status }
    analytics {
      sentiments { negative_pct neutral_pct positive_pct }
      categories { questions date_times metrics tasks }
      speakers {
        speaker_id
        name
        duration
        word_count
        longest_monologue
        monologues_count
        filler_words
        questions
        duration_pct
        words_per_minute
      }
    }
    summary {
      keywords
      action_items
      outline
      shorthand_bullet
      overview
      bullet_gist
      gist
      short_summary
      short_overview
      meeting_type
      topics_discussed
      transcript_chapters
    }
    sentences {
      index
      speaker_id
      speaker_name
      text
      raw_text
      start_time
      end_time
    }
    channels { id }
  }
}
"#;

pub const ANALYTICS: &str = r#"
query Analytics($startTime: String!, $endTime: String!) {
  analytics(start_time: $startTime, end_time: $endTime) {
    team {
      conversation {
        average_filler_words
        average_monologues_count
        average_questions
        average_sentiments { negative_pct neutral_pct positive_pct }
        average_silence_duration
        average_talk_listen_ratio
        average_words_per_minute
        longest_monologue_duration_sec
        total_filler_words
        total_meeting_notes_count
        total_meetings_count
        total_monologues_count
        teammates_count
        total_questions
        total_silence_duration
      }
      meeting {
        count
        duration
        average_count
        average_duration
      }
    }
    users {
      user_id
      user_name
      user_email
      conversation {
        talk_listen_pct
        talk_listen_ratio
        total_silence_duration
        total_speak_duration
        total_word_count
        user_filler_words
        user_longest_monologue_sec
        user_monologues_count
        user_questions
        user_speak_duration
        user_word_count
        user_words_per_minute
      }
      meeting {
        count
        duration
      }
    }
  }
}
"#;
